#[cfg(any(test, feature = "test-mode"))]
pub mod fakes;
pub mod logic;

pub use logic::{
    diff_cluster_spec, requires_replacement, to_kind_config, translate, translate_in,
    ClusterController, ImageDistributor, SpecChange, Translation,
};
