use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::{BackendError, KindClusterConfig};

/// A container acting as a Kubernetes node of exactly one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub name: String,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Node {
            name: name.to_string(),
        }
    }
}

/// How the backend should bootstrap a cluster's topology.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendConfig {
    Default,
    File(PathBuf),
    Structured(KindClusterConfig),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOptions {
    pub config: BackendConfig,
    pub node_image: Option<String>,
    /// When set, block until the control plane reports ready or the duration expires.
    pub wait_for_ready: Option<Duration>,
    /// Kubeconfig file the backend merges the new cluster's entries into.
    pub kubeconfig_path: Option<PathBuf>,
}

#[async_trait]
pub trait ClusterBackend: Send + Sync {
    async fn create(&self, name: &str, options: &CreateOptions) -> Result<(), BackendError>;
    /// Deleting a cluster that does not exist is not an error.
    async fn delete(&self, name: &str, kubeconfig_path: Option<&Path>)
        -> Result<(), BackendError>;
    async fn kubeconfig(&self, name: &str, internal: bool) -> Result<String, BackendError>;
    async fn export_kubeconfig(
        &self,
        name: &str,
        path: &Path,
        internal: bool,
    ) -> Result<(), BackendError>;
    async fn list_nodes(&self, name: &str) -> Result<Vec<Node>, BackendError>;
    async fn list(&self) -> Result<Vec<String>, BackendError>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Content identity of a locally present image.
    async fn inspect_id(&self, reference: &str) -> Result<String, BackendError>;
    async fn save(&self, reference: &str, destination: &Path) -> Result<(), BackendError>;
}

#[async_trait]
pub trait NodeTransfer: Send + Sync {
    async fn load_archive(&self, node: &Node, archive: tokio::fs::File)
        -> Result<(), BackendError>;
    async fn image_present(
        &self,
        node: &Node,
        reference: &str,
    ) -> Result<Option<String>, BackendError>;
}
