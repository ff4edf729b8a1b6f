use kind_defs::{ClusterSpec, StructuredConfig};
use kind_utils::patches_equivalent;
use log::warn;

/// A field whose desired value differs from the observed one. Every field of a
/// cluster is immutable, so any change means replacing the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecChange {
    pub field: String,
}

impl SpecChange {
    fn new(field: &str) -> Self {
        SpecChange {
            field: field.to_string(),
        }
    }
}

pub fn diff_cluster_spec(desired: &ClusterSpec, observed: &ClusterSpec) -> Vec<SpecChange> {
    let mut changes = vec![];

    if desired.name != observed.name {
        changes.push(SpecChange::new("name"));
    }
    if desired.node_image() != observed.node_image() {
        changes.push(SpecChange::new("node_image"));
    }
    if desired.wait_for_ready != observed.wait_for_ready {
        changes.push(SpecChange::new("wait_for_ready"));
    }
    if desired.raw_config_path() != observed.raw_config_path() {
        changes.push(SpecChange::new("raw_config_path"));
    }
    if desired.raw_config_text() != observed.raw_config_text() {
        changes.push(SpecChange::new("raw_config_text"));
    }
    if desired.kubeconfig_path != observed.kubeconfig_path {
        changes.push(SpecChange::new("kubeconfig_path"));
    }

    match (&desired.config, &observed.config) {
        (None, None) => {}
        (Some(desired), Some(observed)) => diff_structured(desired, observed, &mut changes),
        _ => changes.push(SpecChange::new("config")),
    }

    changes
}

pub fn requires_replacement(desired: &ClusterSpec, observed: &ClusterSpec) -> bool {
    !diff_cluster_spec(desired, observed).is_empty()
}

fn diff_structured(
    desired: &StructuredConfig,
    observed: &StructuredConfig,
    changes: &mut Vec<SpecChange>,
) {
    if desired.kind != observed.kind {
        changes.push(SpecChange::new("config.kind"));
    }
    if desired.api_version != observed.api_version {
        changes.push(SpecChange::new("config.api_version"));
    }
    if desired.nodes != observed.nodes {
        changes.push(SpecChange::new("config.nodes"));
    }
    if desired.networking != observed.networking {
        changes.push(SpecChange::new("config.networking"));
    }
    if desired.runtime_config != observed.runtime_config {
        changes.push(SpecChange::new("config.runtime_config"));
    }
    if desired.feature_gates != observed.feature_gates {
        changes.push(SpecChange::new("config.feature_gates"));
    }
    if desired.kubeadm_config_patches != observed.kubeadm_config_patches {
        changes.push(SpecChange::new("config.kubeadm_config_patches"));
    }

    match patches_equivalent(&desired.containerd_patches, &observed.containerd_patches) {
        Ok(true) => {}
        Ok(false) => changes.push(SpecChange::new("config.containerd_patches")),
        Err(e) => {
            // Intent cannot be verified, so assume it changed.
            warn!("Treating containerd patches as changed: {}", e);
            changes.push(SpecChange::new("config.containerd_patches"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kind_defs::{NodeRole, NodeSpec};
    use pretty_assertions::assert_eq;

    fn with_patches(patches: &[&str]) -> ClusterSpec {
        ClusterSpec {
            config: Some(StructuredConfig {
                nodes: vec![NodeSpec::new(NodeRole::ControlPlane)],
                containerd_patches: patches.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            }),
            ..ClusterSpec::new("c1")
        }
    }

    const COMPACT: &str = "[plugins.\"io.containerd.grpc.v1.cri\".registry]\n config_path = \"/etc/containerd/certs.d\"\n";
    const NESTED: &str = "[plugins]\n\n  [plugins.\"io.containerd.grpc.v1.cri\"]\n\n    [plugins.\"io.containerd.grpc.v1.cri\".registry]\n      config_path = \"/etc/containerd/certs.d\"\n";
    const RUNC: &str = "[plugins.\"io.containerd.grpc.v1.cri\".containerd.runtimes.runc]\nruntime_type = \"io.containerd.runc.v2\"\n";

    #[test]
    fn test_reformatted_patch_is_not_a_change() {
        let desired = with_patches(&[COMPACT]);
        let observed = with_patches(&[NESTED]);
        assert!(diff_cluster_spec(&desired, &observed).is_empty());
        assert!(!requires_replacement(&desired, &observed));
    }

    #[test]
    fn test_reordered_patches_are_a_change() {
        let desired = with_patches(&[COMPACT, RUNC]);
        let observed = with_patches(&[RUNC, COMPACT]);
        assert_eq!(
            diff_cluster_spec(&desired, &observed),
            vec![SpecChange::new("config.containerd_patches")]
        );
    }

    #[test]
    fn test_malformed_patch_is_a_change() {
        let desired = with_patches(&["[plugins"]);
        let observed = with_patches(&["[plugins"]);
        assert!(requires_replacement(&desired, &observed));
    }

    #[test]
    fn test_plain_field_changes() {
        let observed = with_patches(&[]);
        let mut desired = observed.clone();
        desired.node_image = Some("kindest/node:v1.30.0".to_string());
        desired.wait_for_ready = true;
        if let Some(config) = desired.config.as_mut() {
            config.nodes.push(NodeSpec::new(NodeRole::Worker));
        }

        let fields: Vec<String> = diff_cluster_spec(&desired, &observed)
            .into_iter()
            .map(|c| c.field)
            .collect();
        assert_eq!(fields, vec!["node_image", "wait_for_ready", "config.nodes"]);
    }

    #[test]
    fn test_kubeconfig_path_change() {
        let observed = ClusterSpec::new("c1");
        let desired = ClusterSpec {
            kubeconfig_path: Some("/work/c1.kubeconfig".into()),
            ..ClusterSpec::new("c1")
        };
        assert_eq!(
            diff_cluster_spec(&desired, &observed),
            vec![SpecChange::new("kubeconfig_path")]
        );
    }

    #[test]
    fn test_empty_strings_match_unset() {
        let observed = ClusterSpec::new("c1");
        let desired = ClusterSpec {
            raw_config_text: Some("".to_string()),
            node_image: Some("".to_string()),
            ..ClusterSpec::new("c1")
        };
        assert!(!requires_replacement(&desired, &observed));
    }
}
