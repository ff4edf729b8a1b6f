use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use kind_defs::ControllerConfig;

fn duration_from_env(key: &str, default: Duration) -> Result<Duration> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => humantime::parse_duration(value.trim())
            .with_context(|| format!("{} is not a valid duration: {:?}", key, value)),
        _ => Ok(default),
    }
}

/// Builds the controller configuration from `KIND_CREATE_TIMEOUT`,
/// `KIND_UPDATE_TIMEOUT`, `KIND_DELETE_TIMEOUT` (e.g. `90s`, `10m`) and
/// `KIND_EXPORT_DIR`, falling back to the defaults for anything unset.
pub fn controller_config_from_env() -> Result<ControllerConfig> {
    let defaults = ControllerConfig::default();
    Ok(ControllerConfig {
        create_timeout: duration_from_env("KIND_CREATE_TIMEOUT", defaults.create_timeout)?,
        update_timeout: duration_from_env("KIND_UPDATE_TIMEOUT", defaults.update_timeout)?,
        delete_timeout: duration_from_env("KIND_DELETE_TIMEOUT", defaults.delete_timeout)?,
        export_dir: env::var("KIND_EXPORT_DIR")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from),
        ..defaults
    })
}

/// `<dir>/<name>-config`, where the kubeconfig of a cluster is exported when
/// the caller did not choose a path.
pub fn default_kubeconfig_export_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}-config", name))
}
