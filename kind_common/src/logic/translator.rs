use std::io::Write;
use std::path::Path;

use kind_defs::{
    BackendConfig, ClusterSpec, KindClusterConfig, KindMount, KindNetworking, KindNode,
    KindPortMapping, KindError, NetworkingSpec, NodeSpec, StructuredConfig,
};
use log::debug;
use tempfile::NamedTempFile;

/// Backend configuration for one create call.
///
/// When `raw_config_text` was set, the translation owns the temporary
/// file holding it, and the file is removed when the translation is dropped.
#[derive(Debug)]
pub struct Translation {
    pub config: BackendConfig,
    scratch: Option<NamedTempFile>,
}

impl Translation {
    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch.as_ref().map(|f| f.path())
    }
}

pub fn translate(spec: &ClusterSpec) -> Result<Translation, KindError> {
    translate_in(spec, &std::env::temp_dir())
}

/// Same as [`translate`], materializing raw config text under `scratch_dir`.
pub fn translate_in(spec: &ClusterSpec, scratch_dir: &Path) -> Result<Translation, KindError> {
    if let Some(text) = spec.raw_config_text() {
        let scratch = write_scratch_config(text, scratch_dir)?;
        debug!("Wrote raw cluster config to {}", scratch.path().display());
        return Ok(Translation {
            config: BackendConfig::File(scratch.path().to_path_buf()),
            scratch: Some(scratch),
        });
    }

    let config = if let Some(path) = spec.raw_config_path() {
        BackendConfig::File(path.into())
    } else if let Some(structured) = &spec.config {
        BackendConfig::Structured(to_kind_config(structured))
    } else {
        BackendConfig::Default
    };

    Ok(Translation {
        config,
        scratch: None,
    })
}

fn write_scratch_config(text: &str, scratch_dir: &Path) -> Result<NamedTempFile, KindError> {
    let mut file = tempfile::Builder::new()
        .prefix("kind-config-")
        .suffix(".yaml")
        .tempfile_in(scratch_dir)
        .map_err(|e| KindError::Translation(format!("failed to create temp file: {}", e)))?;
    // On failure `file` is dropped here, which unlinks it.
    file.write_all(text.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| KindError::Translation(format!("failed to write temp file: {}", e)))?;
    Ok(file)
}

/// Deep conversion into the kind `v1alpha4` document. Nodes and patches keep
/// their order, since kind applies them positionally.
pub fn to_kind_config(config: &StructuredConfig) -> KindClusterConfig {
    KindClusterConfig {
        kind: config.kind.clone(),
        api_version: config.api_version.clone(),
        nodes: config.nodes.iter().map(to_kind_node).collect(),
        networking: config.networking.as_ref().map(to_kind_networking),
        containerd_config_patches: config.containerd_patches.clone(),
        runtime_config: config
            .runtime_config
            .iter()
            .map(|(k, v)| (runtime_config_key(k), v.clone()))
            .collect(),
        feature_gates: config.feature_gates.clone(),
        kubeadm_config_patches: config.kubeadm_config_patches.clone(),
    }
}

// `api_alpha` -> `api/alpha`
fn runtime_config_key(key: &str) -> String {
    key.replace('_', "/")
}

fn to_kind_node(node: &NodeSpec) -> KindNode {
    KindNode {
        role: node.role.as_str().to_string(),
        image: node.image.clone().filter(|i| !i.is_empty()),
        labels: node.labels.clone(),
        extra_port_mappings: node
            .extra_port_mappings
            .iter()
            .map(|m| KindPortMapping {
                container_port: m.container_port,
                host_port: m.host_port,
                listen_address: m.listen_address.clone(),
                protocol: m.protocol.clone(),
            })
            .collect(),
        extra_mounts: node
            .extra_mounts
            .iter()
            .map(|m| KindMount {
                host_path: m.host_path.clone(),
                container_path: m.container_path.clone(),
                read_only: m.read_only,
                propagation: m.propagation.clone(),
            })
            .collect(),
        kubeadm_config_patches: node.kubeadm_config_patches.clone(),
    }
}

fn to_kind_networking(networking: &NetworkingSpec) -> KindNetworking {
    KindNetworking {
        api_server_address: networking.api_server_address.clone(),
        api_server_port: networking.api_server_port,
        pod_subnet: networking.pod_subnet.clone(),
        service_subnet: networking.service_subnet.clone(),
        disable_default_cni: networking.disable_default_cni,
        kube_proxy_mode: networking.kube_proxy_mode.clone(),
        ip_family: networking.ip_family.clone(),
        dns_search: networking.dns_search.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kind_defs::{NodeRole, PortMapping};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn three_node_config() -> StructuredConfig {
        let mut control_plane = NodeSpec::new(NodeRole::ControlPlane);
        control_plane
            .labels
            .insert("name".to_string(), "node0".to_string());
        control_plane.extra_port_mappings.push(PortMapping {
            container_port: 80,
            host_port: Some(8080),
            listen_address: None,
            protocol: Some("TCP".to_string()),
        });
        let mut worker_a = NodeSpec::new(NodeRole::Worker);
        worker_a.image = Some("kindest/node:v1.29.7".to_string());
        let worker_b = NodeSpec::new(NodeRole::Worker);

        StructuredConfig {
            nodes: vec![control_plane, worker_a, worker_b],
            containerd_patches: vec!["[a]\nx = 1\n".to_string(), "[b]\ny = 2\n".to_string()],
            runtime_config: BTreeMap::from([("api_alpha".to_string(), "false".to_string())]),
            networking: Some(NetworkingSpec {
                api_server_address: Some("127.0.0.1".to_string()),
                api_server_port: Some(6443),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_text_takes_precedence_over_path() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ClusterSpec {
            raw_config_text: Some("X".to_string()),
            raw_config_path: Some("/p".to_string()),
            ..ClusterSpec::new("c1")
        };

        let translation = translate_in(&spec, dir.path()).unwrap();
        let scratch = translation.scratch_path().unwrap().to_path_buf();
        assert_eq!(translation.config, BackendConfig::File(scratch.clone()));
        assert_eq!(std::fs::read_to_string(&scratch).unwrap(), "X");

        drop(translation);
        assert!(!scratch.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unwritable_scratch_dir_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let spec = ClusterSpec {
            raw_config_text: Some("X".to_string()),
            ..ClusterSpec::new("c1")
        };

        match translate_in(&spec, &missing) {
            Err(KindError::Translation(_)) => {}
            other => panic!("expected Translation error, got {:?}", other),
        }
        assert!(!missing.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_path_used_when_text_empty() {
        let spec = ClusterSpec {
            raw_config_text: Some("".to_string()),
            raw_config_path: Some("/p".to_string()),
            config: Some(three_node_config()),
            ..ClusterSpec::new("c1")
        };
        let translation = translate(&spec).unwrap();
        assert_eq!(translation.config, BackendConfig::File(PathBuf::from("/p")));
        assert!(translation.scratch_path().is_none());
    }

    #[test]
    fn test_structured_and_default() {
        let spec = ClusterSpec {
            config: Some(three_node_config()),
            ..ClusterSpec::new("c1")
        };
        match translate(&spec).unwrap().config {
            BackendConfig::Structured(kind) => assert_eq!(kind.nodes.len(), 3),
            other => panic!("expected structured config, got {:?}", other),
        }

        let spec = ClusterSpec::new("c1");
        assert_eq!(translate(&spec).unwrap().config, BackendConfig::Default);
    }

    #[test]
    fn test_node_order_and_roles_preserved() {
        let kind = to_kind_config(&three_node_config());
        let roles: Vec<&str> = kind.nodes.iter().map(|n| n.role.as_str()).collect();
        assert_eq!(roles, vec!["control-plane", "worker", "worker"]);
        assert_eq!(kind.nodes[0].labels.get("name").unwrap(), "node0");
        assert_eq!(kind.nodes[0].extra_port_mappings[0].host_port, Some(8080));
        assert_eq!(kind.nodes[1].image.as_deref(), Some("kindest/node:v1.29.7"));
        assert_eq!(kind.nodes[2].image, None);
        assert_eq!(
            kind.containerd_config_patches,
            vec!["[a]\nx = 1\n".to_string(), "[b]\ny = 2\n".to_string()]
        );
        assert_eq!(kind.runtime_config.get("api/alpha").unwrap(), "false");
        assert_eq!(kind.networking.unwrap().api_server_port, Some(6443));
    }

    #[test]
    fn test_translation_is_deterministic() {
        let spec = ClusterSpec {
            config: Some(three_node_config()),
            ..ClusterSpec::new("c1")
        };
        assert_eq!(translate(&spec).unwrap().config, translate(&spec).unwrap().config);
    }
}
