mod cluster;
mod diff;
mod load;
mod translator;

pub use cluster::ClusterController;
pub use diff::{diff_cluster_spec, requires_replacement, SpecChange};
pub use load::ImageDistributor;
pub use translator::{to_kind_config, translate, translate_in, Translation};
