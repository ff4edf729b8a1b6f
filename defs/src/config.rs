use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_DELETE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Bounds the wait-for-ready phase of create.
    pub create_timeout: Duration,
    pub update_timeout: Duration,
    pub delete_timeout: Duration,
    /// Directory for `<name>-config` exports. Falls back to the working directory.
    pub export_dir: Option<PathBuf>,
    /// Where raw config text is materialized during create. Falls back to the
    /// system temp directory.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            create_timeout: DEFAULT_CREATE_TIMEOUT,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
            delete_timeout: DEFAULT_DELETE_TIMEOUT,
            export_dir: None,
            scratch_dir: None,
        }
    }
}
