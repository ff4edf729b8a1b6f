use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kind_common::fakes::FakeBackend;
use kind_common::ClusterController;
use kind_defs::ControllerConfig;

// Each test gets its own export directory, so tests can run in parallel.
pub async fn test_scaffold<F, Fut>(function_to_test: F)
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = ()>,
{
    let workdir = tempfile::tempdir().expect("Failed to create working directory");
    function_to_test(workdir.path().to_path_buf()).await;
}

pub fn controller(backend: FakeBackend, export_dir: &Path) -> ClusterController<FakeBackend> {
    ClusterController::new(
        backend,
        ControllerConfig {
            create_timeout: Duration::from_secs(30),
            export_dir: Some(export_dir.to_path_buf()),
            ..Default::default()
        },
    )
}
