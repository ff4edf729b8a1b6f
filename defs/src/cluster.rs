use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ClusterCredentials;

pub const DEFAULT_CONFIG_KIND: &str = "Cluster";
pub const DEFAULT_CONFIG_API_VERSION: &str = "kind.x-k8s.io/v1alpha4";

/// The resolved node image is part of the identity, so pinning a different
/// image yields a different cluster from the harness' point of view.
pub fn get_cluster_identifier(name: &str, node_image: &str) -> String {
    format!("{}-{}", name, node_image)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ClusterIdentity(String);

impl ClusterIdentity {
    pub fn new(name: &str, node_image: Option<&str>) -> Self {
        ClusterIdentity(get_cluster_identifier(name, node_image.unwrap_or("")))
    }

    pub fn ephemeral(name: &str) -> Self {
        ClusterIdentity(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Desired state of a single kind cluster. Every field is immutable once the
/// cluster exists; a change means destroy and recreate.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct ClusterSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_image: Option<String>,
    #[serde(default)]
    pub wait_for_ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<StructuredConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_config_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_config_text: Option<String>,
    /// Where kind writes the cluster's kubeconfig. Left unset, the controller
    /// exports it to `<name>-config` on the first read instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_path: Option<PathBuf>,
}

impl ClusterSpec {
    pub fn new(name: &str) -> Self {
        ClusterSpec {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn raw_config_text(&self) -> Option<&str> {
        self.raw_config_text.as_deref().filter(|s| !s.is_empty())
    }

    pub fn raw_config_path(&self) -> Option<&str> {
        self.raw_config_path.as_deref().filter(|s| !s.is_empty())
    }

    pub fn node_image(&self) -> Option<&str> {
        self.node_image.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StructuredConfig {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<NetworkingSpec>,
    #[serde(default)]
    pub containerd_patches: Vec<String>,
    #[serde(default)]
    pub runtime_config: BTreeMap<String, String>,
    #[serde(default)]
    pub feature_gates: BTreeMap<String, bool>,
    #[serde(default)]
    pub kubeadm_config_patches: Vec<String>,
}

impl Default for StructuredConfig {
    fn default() -> Self {
        StructuredConfig {
            kind: default_kind(),
            api_version: default_api_version(),
            nodes: vec![],
            networking: None,
            containerd_patches: vec![],
            runtime_config: BTreeMap::new(),
            feature_gates: BTreeMap::new(),
            kubeadm_config_patches: vec![],
        }
    }
}

fn default_kind() -> String {
    DEFAULT_CONFIG_KIND.to_string()
}

fn default_api_version() -> String {
    DEFAULT_CONFIG_API_VERSION.to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::ControlPlane => "control-plane",
            NodeRole::Worker => "worker",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NodeSpec {
    pub role: NodeRole,
    /// Overrides the cluster-level node image for this node only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub extra_port_mappings: Vec<PortMapping>,
    #[serde(default)]
    pub extra_mounts: Vec<Mount>,
    #[serde(default)]
    pub kubeadm_config_patches: Vec<String>,
}

impl NodeSpec {
    pub fn new(role: NodeRole) -> Self {
        NodeSpec {
            role,
            image: None,
            labels: BTreeMap::new(),
            extra_port_mappings: vec![],
            extra_mounts: vec![],
            kubeadm_config_patches: vec![],
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PortMapping {
    pub container_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Mount {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagation: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct NetworkingSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_subnet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_default_cni: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_proxy_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns_search: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    Absent,
    Creating,
    Ready,
    Deleting,
}

/// What the harness stores for a managed cluster between calls.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ClusterRecord {
    pub id: Option<ClusterIdentity>,
    pub spec: ClusterSpec,
    pub state: ClusterState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<ClusterCredentials>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub ephemeral: bool,
}

impl ClusterRecord {
    pub fn absent(spec: ClusterSpec) -> Self {
        ClusterRecord {
            id: None,
            spec,
            state: ClusterState::Absent,
            kubeconfig_path: None,
            credentials: None,
            completed: false,
            ephemeral: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Drops everything derived from a live cluster.
    pub fn clear(&mut self) {
        self.id = None;
        self.state = ClusterState::Absent;
        self.credentials = None;
        self.completed = false;
    }
}
