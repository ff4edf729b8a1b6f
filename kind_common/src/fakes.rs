//! In-memory stand-ins for the kind and container engine command lines.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kind_defs::{
    BackendConfig, BackendError, ClusterBackend, CreateOptions, ImageStore, Node, NodeTransfer,
};
use tokio::io::AsyncReadExt;

// base64 of "CERT", "KEY" and "CA"
const CERT_DATA: &str = "Q0VSVA==";
const KEY_DATA: &str = "S0VZ";
const CA_DATA: &str = "Q0E=";

pub fn fake_kubeconfig(name: &str, port: u16) -> String {
    format!(
        r#"apiVersion: v1
kind: Config
current-context: kind-{name}
clusters:
- name: kind-{name}
  cluster:
    server: https://127.0.0.1:{port}
    certificate-authority-data: {ca}
contexts:
- name: kind-{name}
  context:
    cluster: kind-{name}
    user: kind-{name}
users:
- name: kind-{name}
  user:
    client-certificate-data: {cert}
    client-key-data: {key}
"#,
        name = name,
        port = port,
        ca = CA_DATA,
        cert = CERT_DATA,
        key = KEY_DATA,
    )
}

#[derive(Debug, Clone)]
pub struct FakeCluster {
    pub nodes: Vec<String>,
    pub options: Option<CreateOptions>,
    /// Contents of the config file handed to create, read while the call was in flight.
    pub config_text: Option<String>,
    pub port: u16,
}

#[derive(Debug, Default)]
struct BackendState {
    clusters: BTreeMap<String, FakeCluster>,
    create_failure: Option<String>,
    delete_failure: Option<String>,
    delete_reports_not_found: bool,
    kubeconfig_override: Option<String>,
    exports: Vec<PathBuf>,
    deletes: Vec<(String, Option<PathBuf>)>,
    next_port: u16,
}

/// Clones share the same clusters, so a controller and a distributor can
/// observe each other's effects.
#[derive(Debug, Default, Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        FakeBackend::default()
    }

    pub fn with_cluster(self, name: &str, nodes: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let port = state.allocate_port();
            state.clusters.insert(
                name.to_string(),
                FakeCluster {
                    nodes: nodes.iter().map(|n| n.to_string()).collect(),
                    options: None,
                    config_text: None,
                    port,
                },
            );
        }
        self
    }

    /// Simulates the cluster disappearing behind the controller's back.
    pub fn remove_cluster(&self, name: &str) {
        self.state.lock().unwrap().clusters.remove(name);
    }

    pub fn fail_create(&self, message: &str) {
        self.state.lock().unwrap().create_failure = Some(message.to_string());
    }

    pub fn fail_delete(&self, message: &str) {
        self.state.lock().unwrap().delete_failure = Some(message.to_string());
    }

    pub fn report_not_found_on_delete(&self) {
        self.state.lock().unwrap().delete_reports_not_found = true;
    }

    pub fn override_kubeconfig(&self, blob: &str) {
        self.state.lock().unwrap().kubeconfig_override = Some(blob.to_string());
    }

    pub fn cluster(&self, name: &str) -> Option<FakeCluster> {
        self.state.lock().unwrap().clusters.get(name).cloned()
    }

    pub fn exports(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().exports.clone()
    }

    pub fn deletes(&self) -> Vec<(String, Option<PathBuf>)> {
        self.state.lock().unwrap().deletes.clone()
    }
}

impl BackendState {
    fn allocate_port(&mut self) -> u16 {
        self.next_port += 1;
        40000 + self.next_port
    }
}

fn node_names(name: &str, config: &BackendConfig) -> Vec<String> {
    let roles: Vec<String> = match config {
        BackendConfig::Structured(kind) if !kind.nodes.is_empty() => {
            kind.nodes.iter().map(|n| n.role.clone()).collect()
        }
        _ => vec!["control-plane".to_string()],
    };
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    roles
        .into_iter()
        .map(|role| {
            let count = seen.entry(role.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                format!("{}-{}", name, role)
            } else {
                format!("{}-{}{}", name, role, count)
            }
        })
        .collect()
}

#[async_trait]
impl ClusterBackend for FakeBackend {
    async fn create(&self, name: &str, options: &CreateOptions) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.create_failure.take() {
            return Err(BackendError::CommandFailed {
                command: format!("kind create cluster --name {}", name),
                code: Some(1),
                stderr: message,
            });
        }
        if state.clusters.contains_key(name) {
            return Err(BackendError::CommandFailed {
                command: format!("kind create cluster --name {}", name),
                code: Some(1),
                stderr: format!(
                    "node(s) already exist for a cluster with the name \"{}\"",
                    name
                ),
            });
        }
        let config_text = match &options.config {
            BackendConfig::File(path) => Some(std::fs::read_to_string(path)?),
            _ => None,
        };
        let port = state.allocate_port();
        if let Some(path) = &options.kubeconfig_path {
            std::fs::write(path, fake_kubeconfig(name, port))?;
        }
        state.clusters.insert(
            name.to_string(),
            FakeCluster {
                nodes: node_names(name, &options.config),
                options: Some(options.clone()),
                config_text,
                port,
            },
        );
        Ok(())
    }

    async fn delete(
        &self,
        name: &str,
        kubeconfig_path: Option<&Path>,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        state
            .deletes
            .push((name.to_string(), kubeconfig_path.map(Path::to_path_buf)));
        if let Some(message) = state.delete_failure.take() {
            return Err(BackendError::CommandFailed {
                command: format!("kind delete cluster --name {}", name),
                code: Some(1),
                stderr: message,
            });
        }
        let existed = state.clusters.remove(name).is_some();
        if !existed && state.delete_reports_not_found {
            return Err(BackendError::ClusterNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn kubeconfig(&self, name: &str, _internal: bool) -> Result<String, BackendError> {
        let state = self.state.lock().unwrap();
        let cluster = state
            .clusters
            .get(name)
            .ok_or_else(|| BackendError::ClusterNotFound(name.to_string()))?;
        Ok(state
            .kubeconfig_override
            .clone()
            .unwrap_or_else(|| fake_kubeconfig(name, cluster.port)))
    }

    async fn export_kubeconfig(
        &self,
        name: &str,
        path: &Path,
        internal: bool,
    ) -> Result<(), BackendError> {
        let blob = self.kubeconfig(name, internal).await?;
        std::fs::write(path, blob)?;
        self.state.lock().unwrap().exports.push(path.to_path_buf());
        Ok(())
    }

    async fn list_nodes(&self, name: &str) -> Result<Vec<Node>, BackendError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .clusters
            .get(name)
            .map(|c| c.nodes.iter().map(|n| Node::new(n)).collect())
            .unwrap_or_default())
    }

    async fn list(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.state.lock().unwrap().clusters.keys().cloned().collect())
    }
}

/// Local image store keyed by reference. Saved archives contain the digest on
/// the first line and the reference on the second.
#[derive(Debug, Default)]
pub struct FakeImageStore {
    images: Mutex<BTreeMap<String, String>>,
    saves: Mutex<Vec<PathBuf>>,
}

impl FakeImageStore {
    pub fn new() -> Self {
        FakeImageStore::default()
    }

    pub fn with_image(self, reference: &str, digest: &str) -> Self {
        self.tag(reference, digest);
        self
    }

    /// Points `reference` at new content, like a rebuild under the same tag.
    pub fn tag(&self, reference: &str, digest: &str) {
        self.images
            .lock()
            .unwrap()
            .insert(reference.to_string(), digest.to_string());
    }

    pub fn saves(&self) -> Vec<PathBuf> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageStore for FakeImageStore {
    async fn inspect_id(&self, reference: &str) -> Result<String, BackendError> {
        self.images
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| BackendError::ImageNotFound(reference.to_string()))
    }

    async fn save(&self, reference: &str, destination: &Path) -> Result<(), BackendError> {
        let digest = self.inspect_id(reference).await?;
        tokio::fs::write(destination, format!("{}\n{}", digest, reference)).await?;
        self.saves.lock().unwrap().push(destination.to_path_buf());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeNodeTransfer {
    failing_nodes: BTreeSet<String>,
    /// node -> (reference -> digest)
    images: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    push_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pushes: AtomicUsize,
}

impl FakeNodeTransfer {
    pub fn new() -> Self {
        FakeNodeTransfer {
            push_delay: Duration::from_millis(50),
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, node: &str) -> Self {
        self.failing_nodes.insert(node.to_string());
        self
    }

    pub fn with_image_on(self, node: &str, reference: &str, digest: &str) -> Self {
        self.images
            .lock()
            .unwrap()
            .entry(node.to_string())
            .or_default()
            .insert(reference.to_string(), digest.to_string());
        self
    }

    pub fn evict(&self, node: &str, reference: &str) {
        if let Some(images) = self.images.lock().unwrap().get_mut(node) {
            images.remove(reference);
        }
    }

    pub fn has_image(&self, node: &str, reference: &str) -> bool {
        self.images
            .lock()
            .unwrap()
            .get(node)
            .map(|images| images.contains_key(reference))
            .unwrap_or(false)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn pushes(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeTransfer for FakeNodeTransfer {
    async fn load_archive(
        &self,
        node: &Node,
        mut archive: tokio::fs::File,
    ) -> Result<(), BackendError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        self.pushes.fetch_add(1, Ordering::SeqCst);

        let mut contents = String::new();
        let read = archive.read_to_string(&mut contents).await;
        tokio::time::sleep(self.push_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        read?;

        if self.failing_nodes.contains(&node.name) {
            return Err(BackendError::CommandFailed {
                command: format!("ctr images import on {}", node.name),
                code: Some(1),
                stderr: "no space left on device".to_string(),
            });
        }

        let mut lines = contents.lines();
        match (lines.next(), lines.next()) {
            (Some(digest), Some(reference)) => {
                self.images
                    .lock()
                    .unwrap()
                    .entry(node.name.clone())
                    .or_default()
                    .insert(reference.to_string(), digest.to_string());
                Ok(())
            }
            _ => Err(BackendError::UnexpectedOutput {
                command: "ctr images import".to_string(),
                detail: "archive is not a saved image".to_string(),
            }),
        }
    }

    async fn image_present(
        &self,
        node: &Node,
        reference: &str,
    ) -> Result<Option<String>, BackendError> {
        Ok(self
            .images
            .lock()
            .unwrap()
            .get(&node.name)
            .and_then(|images| images.get(reference).cloned()))
    }
}
