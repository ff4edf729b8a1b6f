mod backend;
mod cluster;
mod config;
mod credentials;
mod errors;
mod kind_config;
mod load;

pub use backend::{BackendConfig, ClusterBackend, CreateOptions, ImageStore, Node, NodeTransfer};
pub use cluster::{
    get_cluster_identifier, ClusterIdentity, ClusterRecord, ClusterSpec, ClusterState, Mount,
    NetworkingSpec, NodeRole, NodeSpec, PortMapping, StructuredConfig, DEFAULT_CONFIG_API_VERSION,
    DEFAULT_CONFIG_KIND,
};
pub use config::{
    ControllerConfig, DEFAULT_CREATE_TIMEOUT, DEFAULT_DELETE_TIMEOUT, DEFAULT_UPDATE_TIMEOUT,
};
pub use credentials::ClusterCredentials;
pub use errors::{BackendError, KindError};
pub use kind_config::{KindClusterConfig, KindMount, KindNetworking, KindNode, KindPortMapping};
pub use load::{get_load_identifier, LoadRecord};
