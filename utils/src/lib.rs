mod config;
mod config_equivalence;
mod kubeconfig;
mod logging;

pub use config::{controller_config_from_env, default_kubeconfig_export_path};
pub use config_equivalence::{equivalent, patches_equivalent};
pub use kubeconfig::credentials_from_kubeconfig;
pub use logging::setup_logging;
