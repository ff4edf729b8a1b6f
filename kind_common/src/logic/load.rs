use std::path::Path;
use std::sync::Arc;

use kind_defs::{
    BackendError, ClusterBackend, ImageStore, KindError, LoadRecord, Node, NodeTransfer,
};
use log::{debug, error, info, warn};
use tokio::task::JoinSet;

const ARCHIVE_NAME: &str = "images.tar";

/// Pushes locally built images into every node of a cluster.
pub struct ImageDistributor<S, T, B>
where
    S: ImageStore,
    T: NodeTransfer + 'static,
    B: ClusterBackend,
{
    store: S,
    transfer: Arc<T>,
    backend: B,
}

impl<S, T, B> ImageDistributor<S, T, B>
where
    S: ImageStore,
    T: NodeTransfer + 'static,
    B: ClusterBackend,
{
    pub fn new(store: S, transfer: T, backend: B) -> Self {
        ImageDistributor {
            store,
            transfer: Arc::new(transfer),
            backend,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn transfer(&self) -> &T {
        &self.transfer
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Loads `image` into every node of `cluster_name`.
    ///
    /// All or nothing: if any node fails, no record is produced, even though
    /// other nodes may already hold the image.
    pub async fn load(&self, image: &str, cluster_name: &str) -> Result<LoadRecord, KindError> {
        info!("Loading image {:?} into kind cluster {:?}...", image, cluster_name);

        let digest = self
            .store
            .inspect_id(image)
            .await
            .map_err(|e| KindError::ImageNotFound {
                image: image.to_string(),
                reason: e.to_string(),
            })?;

        let nodes = match self.backend.list_nodes(cluster_name).await {
            Ok(nodes) => nodes,
            Err(BackendError::ClusterNotFound(_)) => vec![],
            Err(e) => {
                return Err(KindError::BackendRead {
                    name: cluster_name.to_string(),
                    reason: format!("failed to list nodes: {}", e),
                })
            }
        };
        if nodes.is_empty() {
            return Err(KindError::ClusterNotFound(cluster_name.to_string()));
        }

        // Removed when dropped, which happens only after every push task was joined.
        let workdir = tempfile::Builder::new().prefix("kind-load").tempdir()?;
        let archive = workdir.path().join(ARCHIVE_NAME);
        self.store
            .save(image, &archive)
            .await
            .map_err(|source| KindError::ImageSave {
                image: image.to_string(),
                source,
            })?;

        push_to_nodes(&self.transfer, nodes, &archive).await?;

        let record = LoadRecord {
            image: image.to_string(),
            cluster_name: cluster_name.to_string(),
            resolved_image_digest: digest,
        };
        info!(
            "Successfully loaded image {:?} into cluster {:?} ({})",
            image,
            cluster_name,
            record.id()
        );
        Ok(record)
    }

    /// Returns the record while it still holds, `None` once it went stale.
    ///
    /// Presence on any single node is enough; full-cluster consistency is only
    /// established by `load`.
    pub async fn read(&self, record: &LoadRecord) -> Result<Option<LoadRecord>, KindError> {
        let nodes = match self.backend.list_nodes(&record.cluster_name).await {
            Ok(nodes) if !nodes.is_empty() => nodes,
            _ => {
                warn!(
                    "Cluster {:?} not found or has no nodes, dropping load of {:?}",
                    record.cluster_name, record.image
                );
                return Ok(None);
            }
        };

        for node in &nodes {
            match self.transfer.image_present(node, &record.image).await {
                Ok(Some(id)) if id == record.resolved_image_digest => {
                    debug!("Image {:?} present on node {}", record.image, node.name);
                    return Ok(Some(record.clone()));
                }
                Ok(Some(id)) => {
                    debug!(
                        "Node {} holds {:?} as {}, expected {}",
                        node.name, record.image, id, record.resolved_image_digest
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    debug!("Failed to inspect {:?} on node {}: {}", record.image, node.name, e);
                }
            }
        }

        warn!(
            "Image {:?} not found on any node in cluster {:?}, dropping load",
            record.image, record.cluster_name
        );
        Ok(None)
    }

    /// Forgets the record. The image stays on the nodes.
    pub fn delete(&self, record: &LoadRecord) {
        debug!("Dropping load record {}", record.id());
    }
}

/// One task per node, each with its own read handle on the shared archive.
/// Every task is joined before returning; the first failure observed wins.
async fn push_to_nodes<T>(
    transfer: &Arc<T>,
    nodes: Vec<Node>,
    archive: &Path,
) -> Result<(), KindError>
where
    T: NodeTransfer + 'static,
{
    let mut tasks = JoinSet::new();
    for node in nodes {
        let transfer = Arc::clone(transfer);
        let archive = archive.to_path_buf();
        tasks.spawn(async move {
            let result = match tokio::fs::File::open(&archive).await {
                Ok(file) => transfer.load_archive(&node, file).await,
                Err(e) => Err(BackendError::Io(e)),
            };
            (node, result)
        });
    }

    let mut first_failure: Option<KindError> = None;
    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((node, Ok(()))) => {
                debug!("Loaded archive onto node {}", node.name);
                continue;
            }
            Ok((node, Err(source))) => {
                error!("Failed to load archive onto node {}: {}", node.name, source);
                KindError::NodePush {
                    node: node.name,
                    source,
                }
            }
            Err(join_error) => {
                error!("Image push task did not complete: {}", join_error);
                KindError::NodePush {
                    node: "<unknown>".to_string(),
                    source: BackendError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        join_error.to_string(),
                    )),
                }
            }
        };
        if first_failure.is_none() {
            first_failure = Some(failure);
        }
    }

    match first_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
