use std::path::PathBuf;

use kind_defs::{
    BackendConfig, BackendError, ClusterBackend, ClusterIdentity, ClusterRecord, ClusterSpec,
    ClusterState, ControllerConfig, CreateOptions, KindError,
};
use kind_utils::{credentials_from_kubeconfig, default_kubeconfig_export_path};
use log::{debug, info, warn};

use super::translator::translate_in;

/// Drives create/read/delete of kind clusters against a backend.
///
/// Calls for the same cluster name are expected to be serialized by the
/// caller; the controller keeps no state of its own between calls.
pub struct ClusterController<B: ClusterBackend> {
    backend: B,
    config: ControllerConfig,
}

impl<B: ClusterBackend> ClusterController<B> {
    pub fn new(backend: B, config: ControllerConfig) -> Self {
        ClusterController { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Provisions the cluster described by `spec` and returns its first read.
    ///
    /// A failed create is not retried: the backend may have left a partial
    /// cluster behind, and recovering from that is left to the caller.
    pub async fn create(&self, spec: ClusterSpec) -> Result<ClusterRecord, KindError> {
        info!("Creating local Kubernetes cluster {}...", spec.name);
        let mut record = ClusterRecord::absent(spec);
        record.state = ClusterState::Creating;

        let scratch_dir = match &self.config.scratch_dir {
            Some(dir) => dir.clone(),
            None => std::env::temp_dir(),
        };
        let translation = translate_in(&record.spec, &scratch_dir)?;
        let options = CreateOptions {
            config: translation.config.clone(),
            node_image: record.spec.node_image().map(str::to_string),
            wait_for_ready: if record.spec.wait_for_ready {
                Some(self.config.create_timeout)
            } else {
                None
            },
            kubeconfig_path: record.spec.kubeconfig_path.clone(),
        };
        if let Some(image) = &options.node_image {
            info!("Using defined node_image: {}", image);
        }
        if let Some(timeout) = options.wait_for_ready {
            info!("Will wait up to {:?} for cluster nodes to report ready", timeout);
        }

        let created = self.backend.create(record.name(), &options).await;
        // The scratch config (if any) is only needed for the duration of the call.
        drop(translation);
        created.map_err(|source| KindError::BackendCreate {
            name: record.name().to_string(),
            source,
        })?;

        let id = ClusterIdentity::new(record.name(), record.spec.node_image());
        info!("Created cluster {} with id {}", record.name(), id);
        record.id = Some(id);
        record.state = ClusterState::Ready;
        // A caller-chosen path already holds the kubeconfig, so read skips the export.
        record.kubeconfig_path = record.spec.kubeconfig_path.clone();

        self.read(&mut record).await?;
        Ok(record)
    }

    /// Creates a cluster with the backend's default topology, identified by name alone.
    pub async fn create_ephemeral(&self, name: &str) -> Result<ClusterRecord, KindError> {
        info!("Creating ephemeral kind cluster: {}", name);
        let mut record = ClusterRecord::absent(ClusterSpec::new(name));
        record.ephemeral = true;
        record.state = ClusterState::Creating;

        let options = CreateOptions {
            config: BackendConfig::Default,
            node_image: None,
            wait_for_ready: None,
            kubeconfig_path: None,
        };
        self.backend
            .create(name, &options)
            .await
            .map_err(|source| KindError::BackendCreate {
                name: name.to_string(),
                source,
            })?;

        record.id = Some(ClusterIdentity::ephemeral(name));
        record.state = ClusterState::Ready;
        self.read(&mut record).await?;
        Ok(record)
    }

    /// Refreshes credentials from the live cluster.
    ///
    /// A cluster the backend no longer knows about is not an error: the record
    /// is reset to `Absent` so the caller can recreate it.
    pub async fn read(&self, record: &mut ClusterRecord) -> Result<(), KindError> {
        let name = record.name().to_string();
        debug!("Reading cluster {} (id: {:?})", name, record.id);

        let clusters = self
            .backend
            .list()
            .await
            .map_err(|e| read_error(&name, e))?;
        if !clusters.iter().any(|c| c == &name) {
            warn!("Cluster {} not found, marking it absent", name);
            record.clear();
            return Ok(());
        }

        let kubeconfig = match self.backend.kubeconfig(&name, false).await {
            Ok(kubeconfig) => kubeconfig,
            Err(BackendError::ClusterNotFound(_)) => {
                warn!("Cluster {} disappeared while reading, marking it absent", name);
                record.clear();
                return Ok(());
            }
            Err(e) => return Err(read_error(&name, e)),
        };

        let credentials =
            credentials_from_kubeconfig(&kubeconfig).map_err(|e| KindError::BackendRead {
                name: name.clone(),
                reason: format!("{:#}", e),
            })?;

        if record.kubeconfig_path.is_none() && !record.ephemeral {
            let export_path = self.export_path(&name)?;
            self.backend
                .export_kubeconfig(&name, &export_path, false)
                .await
                .map_err(|e| read_error(&name, e))?;
            info!("Exported kubeconfig of {} to {}", name, export_path.display());
            record.kubeconfig_path = Some(export_path);
        }

        record.credentials = Some(credentials);
        record.state = ClusterState::Ready;
        record.completed = true;
        Ok(())
    }

    /// Read-only view of an existing cluster, for callers that only consume it.
    /// The record carries no kubeconfig path, so nothing is exported.
    pub async fn lookup(&self, name: &str) -> Result<ClusterRecord, KindError> {
        let kubeconfig = self
            .backend
            .kubeconfig(name, false)
            .await
            .map_err(|e| read_error(name, e))?;
        let credentials =
            credentials_from_kubeconfig(&kubeconfig).map_err(|e| KindError::BackendRead {
                name: name.to_string(),
                reason: format!("{:#}", e),
            })?;

        let mut record = ClusterRecord::absent(ClusterSpec::new(name));
        record.id = Some(ClusterIdentity::ephemeral(name));
        record.state = ClusterState::Ready;
        record.credentials = Some(credentials);
        record.completed = true;
        Ok(record)
    }

    /// Tears the cluster down and prunes its entries from the exported
    /// kubeconfig. A cluster that is already gone counts as deleted.
    pub async fn delete(&self, record: &mut ClusterRecord) -> Result<(), KindError> {
        let name = record.name().to_string();
        info!("Deleting local Kubernetes cluster {}...", name);
        let previous = record.state;
        record.state = ClusterState::Deleting;

        let kubeconfig_path = if record.ephemeral {
            None
        } else {
            record.kubeconfig_path.clone()
        };
        match self.backend.delete(&name, kubeconfig_path.as_deref()).await {
            Ok(()) => {}
            Err(BackendError::ClusterNotFound(_)) => {
                info!("Cluster {} was already gone", name);
            }
            Err(source) => {
                record.state = previous;
                return Err(KindError::BackendDelete { name, source });
            }
        }

        record.clear();
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<String>, KindError> {
        self.backend
            .list()
            .await
            .map_err(|e| read_error("*", e))
    }

    fn export_path(&self, name: &str) -> Result<PathBuf, KindError> {
        let dir = match &self.config.export_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(default_kubeconfig_export_path(&dir, name))
    }
}

fn read_error(name: &str, e: BackendError) -> KindError {
    KindError::BackendRead {
        name: name.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeBackend;
    use kind_defs::{NodeRole, NodeSpec, StructuredConfig};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn controller(
        backend: FakeBackend,
        export_dir: &std::path::Path,
    ) -> ClusterController<FakeBackend> {
        ClusterController::new(
            backend,
            ControllerConfig {
                create_timeout: Duration::from_secs(42),
                export_dir: Some(export_dir.to_path_buf()),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(FakeBackend::new(), dir.path());
        let spec = ClusterSpec {
            node_image: Some("kindest/node:v1.29.7".to_string()),
            wait_for_ready: true,
            ..ClusterSpec::new("c1")
        };

        let record = controller.create(spec).await.unwrap();

        assert_eq!(record.id.as_ref().unwrap().as_str(), "c1-kindest/node:v1.29.7");
        assert_eq!(record.state, ClusterState::Ready);
        assert!(record.completed);
        let credentials = record.credentials.as_ref().unwrap();
        assert_eq!(credentials.client_certificate, b"CERT".to_vec());
        assert_eq!(credentials.client_key, b"KEY".to_vec());
        assert_eq!(credentials.ca_certificate, b"CA".to_vec());
        assert_eq!(credentials.endpoint.host_str(), Some("127.0.0.1"));

        let options = controller.backend().cluster("c1").unwrap().options.unwrap();
        assert_eq!(options.node_image.as_deref(), Some("kindest/node:v1.29.7"));
        assert_eq!(options.wait_for_ready, Some(Duration::from_secs(42)));
        assert_eq!(options.config, BackendConfig::Default);
    }

    #[tokio::test]
    async fn test_create_passes_structured_config_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(FakeBackend::new(), dir.path());
        let spec = ClusterSpec {
            config: Some(StructuredConfig {
                nodes: vec![
                    NodeSpec::new(NodeRole::ControlPlane),
                    NodeSpec::new(NodeRole::Worker),
                    NodeSpec::new(NodeRole::Worker),
                ],
                ..Default::default()
            }),
            ..ClusterSpec::new("c1")
        };

        controller.create(spec).await.unwrap();

        let cluster = controller.backend().cluster("c1").unwrap();
        assert_eq!(
            cluster.nodes,
            vec!["c1-control-plane", "c1-worker", "c1-worker2"]
        );
        assert_eq!(cluster.options.unwrap().wait_for_ready, None);
    }

    #[tokio::test]
    async fn test_raw_text_is_visible_during_create_and_removed_after() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(FakeBackend::new(), dir.path());
        let spec = ClusterSpec {
            raw_config_text: Some("kind: Cluster\n".to_string()),
            raw_config_path: Some("/p".to_string()),
            ..ClusterSpec::new("c1")
        };

        controller.create(spec).await.unwrap();

        let cluster = controller.backend().cluster("c1").unwrap();
        assert_eq!(cluster.config_text.as_deref(), Some("kind: Cluster\n"));
        match cluster.options.unwrap().config {
            BackendConfig::File(path) => assert!(!path.exists()),
            other => panic!("expected a config file, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new();
        backend.fail_create("failed to init node with kubeadm");
        let controller = controller(backend, dir.path());

        let err = controller.create(ClusterSpec::new("c1")).await.unwrap_err();
        match err {
            KindError::BackendCreate { name, source } => {
                assert_eq!(name, "c1");
                assert!(source.to_string().contains("failed to init node with kubeadm"));
            }
            other => panic!("expected BackendCreate, got {:?}", other),
        }
        assert!(controller.backend().cluster("c1").is_none());
    }

    #[tokio::test]
    async fn test_create_failure_removes_raw_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new();
        backend.fail_create("failed to init node with kubeadm");
        let controller = ClusterController::new(
            backend,
            ControllerConfig {
                export_dir: Some(dir.path().to_path_buf()),
                scratch_dir: Some(scratch.path().to_path_buf()),
                ..Default::default()
            },
        );
        let spec = ClusterSpec {
            raw_config_text: Some("kind: Cluster\n".to_string()),
            ..ClusterSpec::new("c1")
        };

        let err = controller.create(spec).await.unwrap_err();

        assert!(matches!(err, KindError::BackendCreate { .. }));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_read_missing_cluster_marks_absent() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(FakeBackend::new(), dir.path());
        let mut record = controller.create(ClusterSpec::new("c1")).await.unwrap();

        controller.backend().remove_cluster("c1");
        controller.read(&mut record).await.unwrap();

        assert_eq!(record.state, ClusterState::Absent);
        assert_eq!(record.id, None);
        assert_eq!(record.credentials, None);
        assert!(!record.completed);
    }

    #[tokio::test]
    async fn test_kubeconfig_exported_once() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(FakeBackend::new(), dir.path());
        let mut record = controller.create(ClusterSpec::new("c1")).await.unwrap();

        let expected = dir.path().join("c1-config");
        assert_eq!(record.kubeconfig_path.as_deref(), Some(expected.as_path()));
        assert!(expected.exists());

        controller.read(&mut record).await.unwrap();
        controller.read(&mut record).await.unwrap();
        assert_eq!(controller.backend().exports(), vec![expected]);
    }

    #[tokio::test]
    async fn test_export_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("c1-config");
        std::fs::write(&stale, "stale").unwrap();
        let controller = controller(FakeBackend::new(), dir.path());

        controller.create(ClusterSpec::new("c1")).await.unwrap();

        let contents = std::fs::read_to_string(&stale).unwrap();
        assert!(contents.contains("current-context: kind-c1"));
    }

    #[tokio::test]
    async fn test_unparsable_kubeconfig_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new().with_cluster("c1", &["c1-control-plane"]);
        backend.override_kubeconfig("current-context: missing\n");
        let controller = controller(backend, dir.path());
        let mut record = ClusterRecord::absent(ClusterSpec::new("c1"));
        record.id = Some(ClusterIdentity::new("c1", None));

        let err = controller.read(&mut record).await.unwrap_err();
        assert!(matches!(err, KindError::BackendRead { .. }));
        assert!(record.id.is_some());
        assert_eq!(record.kubeconfig_path, None);
        assert!(controller.backend().exports().is_empty());
    }

    #[tokio::test]
    async fn test_supplied_kubeconfig_path_skips_export() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(FakeBackend::new(), dir.path());
        let supplied = dir.path().join("shared.kubeconfig");
        let spec = ClusterSpec {
            kubeconfig_path: Some(supplied.clone()),
            ..ClusterSpec::new("c1")
        };

        let mut record = controller.create(spec).await.unwrap();

        assert_eq!(record.kubeconfig_path.as_deref(), Some(supplied.as_path()));
        assert!(controller.backend().exports().is_empty());
        assert!(!dir.path().join("c1-config").exists());
        let options = controller.backend().cluster("c1").unwrap().options.unwrap();
        assert_eq!(options.kubeconfig_path.as_deref(), Some(supplied.as_path()));
        assert!(std::fs::read_to_string(&supplied)
            .unwrap()
            .contains("current-context: kind-c1"));

        controller.delete(&mut record).await.unwrap();
        assert_eq!(
            controller.backend().deletes(),
            vec![("c1".to_string(), Some(supplied))]
        );
    }

    #[tokio::test]
    async fn test_delete_passes_kubeconfig_and_clears_identity() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(FakeBackend::new(), dir.path());
        let mut record = controller.create(ClusterSpec::new("c1")).await.unwrap();

        controller.delete(&mut record).await.unwrap();

        assert_eq!(record.state, ClusterState::Absent);
        assert_eq!(record.id, None);
        assert_eq!(
            controller.backend().deletes(),
            vec![("c1".to_string(), Some(dir.path().join("c1-config")))]
        );
        assert!(controller.backend().cluster("c1").is_none());
    }

    #[tokio::test]
    async fn test_delete_is_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new();
        backend.report_not_found_on_delete();
        let controller = controller(backend, dir.path());
        let mut record = controller.create(ClusterSpec::new("c1")).await.unwrap();

        controller.delete(&mut record).await.unwrap();
        controller.delete(&mut record).await.unwrap();
        assert_eq!(record.state, ClusterState::Absent);
    }

    #[tokio::test]
    async fn test_delete_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(FakeBackend::new(), dir.path());
        let mut record = controller.create(ClusterSpec::new("c1")).await.unwrap();
        controller.backend().fail_delete("container is paused");

        let err = controller.delete(&mut record).await.unwrap_err();
        assert!(matches!(err, KindError::BackendDelete { .. }));
        assert_eq!(record.state, ClusterState::Ready);
        assert!(record.id.is_some());
    }

    #[tokio::test]
    async fn test_ephemeral_cluster() {
        let dir = tempfile::tempdir().unwrap();
        let controller = controller(FakeBackend::new(), dir.path());

        let mut record = controller.create_ephemeral("e1").await.unwrap();
        assert_eq!(record.id.as_ref().unwrap().as_str(), "e1");
        assert!(record.completed);
        assert_eq!(record.kubeconfig_path, None);
        assert!(controller.backend().exports().is_empty());

        controller.delete(&mut record).await.unwrap();
        assert_eq!(controller.backend().deletes(), vec![("e1".to_string(), None)]);
    }

    #[tokio::test]
    async fn test_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FakeBackend::new().with_cluster("existing", &["existing-control-plane"]);
        let controller = controller(backend, dir.path());

        let record = controller.lookup("existing").await.unwrap();
        assert_eq!(record.id.as_ref().unwrap().as_str(), "existing");
        assert!(record.completed);
        assert!(record.credentials.is_some());
        assert!(!record.ephemeral);
        assert_eq!(record.kubeconfig_path, None);
        assert!(controller.backend().exports().is_empty());

        assert!(matches!(
            controller.lookup("missing").await,
            Err(KindError::BackendRead { .. })
        ));
    }
}
