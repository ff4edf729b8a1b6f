use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use kind_defs::{BackendConfig, BackendError, ClusterBackend, CreateOptions, Node};
use log::{debug, info};

use crate::cmd::{command, run_command, CommandOutput, Input};

pub const DEFAULT_KIND_BINARY: &str = "kind";

const EXTERNAL_LOAD_BALANCER: &str = "external-load-balancer";

// Printed by kind when no node container carries the cluster label.
const NOT_FOUND_MARKERS: [&str; 2] = [
    "could not locate any control plane nodes",
    "No kind nodes found",
];

/// [`ClusterBackend`] driving the `kind` command line.
#[derive(Debug, Clone)]
pub struct KindCli {
    binary: String,
}

impl KindCli {
    pub fn new(binary: &str) -> Self {
        KindCli {
            binary: binary.to_string(),
        }
    }

    /// Uses `KIND_BINARY` when set.
    pub fn from_env() -> Self {
        let binary = std::env::var("KIND_BINARY")
            .ok()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_KIND_BINARY.to_string());
        KindCli::new(&binary)
    }

    async fn run(&self, args: &[&str], input: Input) -> Result<CommandOutput, BackendError> {
        let mut exec = command(&self.binary, args);
        run_command(&mut exec, input).await
    }

    async fn run_for_cluster(
        &self,
        name: &str,
        args: &[&str],
    ) -> Result<CommandOutput, BackendError> {
        self.run(args, Input::Null)
            .await
            .map_err(|e| not_found_as_missing(name, e))
    }
}

fn not_found_as_missing(name: &str, error: BackendError) -> BackendError {
    match error {
        BackendError::CommandFailed { ref stderr, .. }
            if NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m)) =>
        {
            BackendError::ClusterNotFound(name.to_string())
        }
        other => other,
    }
}

fn wait_arg(wait: Duration) -> String {
    format!("{}s", wait.as_secs().max(1))
}

fn create_args(name: &str, options: &CreateOptions) -> Vec<String> {
    let mut args: Vec<String> = vec!["create", "cluster", "--name", name]
        .into_iter()
        .map(String::from)
        .collect();
    if let Some(image) = options.node_image.as_deref().filter(|i| !i.is_empty()) {
        args.push("--image".to_string());
        args.push(image.to_string());
    }
    if let Some(wait) = options.wait_for_ready {
        args.push("--wait".to_string());
        args.push(wait_arg(wait));
    }
    if let Some(path) = &options.kubeconfig_path {
        args.push("--kubeconfig".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    match &options.config {
        BackendConfig::Default => {}
        BackendConfig::File(path) => {
            args.push("--config".to_string());
            args.push(path.to_string_lossy().into_owned());
        }
        BackendConfig::Structured(_) => {
            args.push("--config".to_string());
            args.push("-".to_string());
        }
    }
    args
}

fn parse_nodes(output: &CommandOutput) -> Vec<Node> {
    output
        .stdout_lines()
        .into_iter()
        .filter(|line| !NOT_FOUND_MARKERS.iter().any(|m| line.contains(m)))
        .filter(|line| !line.ends_with(EXTERNAL_LOAD_BALANCER))
        .map(Node::new)
        .collect()
}

fn parse_clusters(output: &CommandOutput) -> Vec<String> {
    output
        .stdout_lines()
        .into_iter()
        .filter(|line| !line.starts_with("No kind clusters found"))
        .map(String::from)
        .collect()
}

#[async_trait]
impl ClusterBackend for KindCli {
    async fn create(&self, name: &str, options: &CreateOptions) -> Result<(), BackendError> {
        let args = create_args(name, options);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let input = match &options.config {
            BackendConfig::Structured(config) => {
                let yaml = config.to_yaml().map_err(|e| BackendError::UnexpectedOutput {
                    command: "kind create cluster".to_string(),
                    detail: format!("failed to render cluster config: {}", e),
                })?;
                debug!("Cluster config for {}:\n{}", name, yaml);
                Input::Bytes(yaml.into_bytes())
            }
            _ => Input::Null,
        };
        let output = self.run(&args, input).await?;
        debug!("kind create cluster {}:\n{}", name, output.stderr.trim_end());
        info!("kind created cluster {}", name);
        Ok(())
    }

    async fn delete(
        &self,
        name: &str,
        kubeconfig_path: Option<&Path>,
    ) -> Result<(), BackendError> {
        let path = kubeconfig_path.map(|p| p.to_string_lossy().into_owned());
        let mut args = vec!["delete", "cluster", "--name", name];
        if let Some(path) = path.as_deref() {
            args.push("--kubeconfig");
            args.push(path);
        }
        self.run_for_cluster(name, &args).await?;
        Ok(())
    }

    async fn kubeconfig(&self, name: &str, internal: bool) -> Result<String, BackendError> {
        let mut args = vec!["get", "kubeconfig", "--name", name];
        if internal {
            args.push("--internal");
        }
        let output = self.run_for_cluster(name, &args).await?;
        Ok(output.stdout)
    }

    async fn export_kubeconfig(
        &self,
        name: &str,
        path: &Path,
        internal: bool,
    ) -> Result<(), BackendError> {
        let path = path.to_string_lossy().into_owned();
        let mut args = vec![
            "export",
            "kubeconfig",
            "--name",
            name,
            "--kubeconfig",
            path.as_str(),
        ];
        if internal {
            args.push("--internal");
        }
        self.run_for_cluster(name, &args).await?;
        Ok(())
    }

    async fn list_nodes(&self, name: &str) -> Result<Vec<Node>, BackendError> {
        let output = self
            .run_for_cluster(name, &["get", "nodes", "--name", name])
            .await?;
        Ok(parse_nodes(&output))
    }

    async fn list(&self) -> Result<Vec<String>, BackendError> {
        let output = self.run(&["get", "clusters"], Input::Null).await?;
        Ok(parse_clusters(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kind_defs::KindClusterConfig;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn output(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_create_args() {
        let options = CreateOptions {
            config: BackendConfig::File(PathBuf::from("/tmp/kind-config-1.yaml")),
            node_image: Some("kindest/node:v1.30.0".to_string()),
            wait_for_ready: Some(Duration::from_secs(300)),
            kubeconfig_path: Some(PathBuf::from("/work/c1.kubeconfig")),
        };
        assert_eq!(
            create_args("c1", &options),
            vec![
                "create",
                "cluster",
                "--name",
                "c1",
                "--image",
                "kindest/node:v1.30.0",
                "--wait",
                "300s",
                "--kubeconfig",
                "/work/c1.kubeconfig",
                "--config",
                "/tmp/kind-config-1.yaml",
            ]
        );
    }

    #[test]
    fn test_structured_config_is_piped() {
        let options = CreateOptions {
            config: BackendConfig::Structured(KindClusterConfig {
                kind: "Cluster".to_string(),
                api_version: "kind.x-k8s.io/v1alpha4".to_string(),
                nodes: vec![],
                networking: None,
                containerd_config_patches: vec![],
                runtime_config: Default::default(),
                feature_gates: Default::default(),
                kubeadm_config_patches: vec![],
            }),
            node_image: Some("".to_string()),
            wait_for_ready: None,
            kubeconfig_path: None,
        };
        assert_eq!(
            create_args("c1", &options),
            vec!["create", "cluster", "--name", "c1", "--config", "-"]
        );
    }

    #[test]
    fn test_parse_nodes_skips_load_balancer() {
        let nodes = parse_nodes(&output(
            "c1-external-load-balancer\nc1-control-plane\nc1-control-plane2\nc1-worker\n",
        ));
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["c1-control-plane", "c1-control-plane2", "c1-worker"]);
    }

    #[test]
    fn test_parse_nodes_without_cluster() {
        assert!(parse_nodes(&output("No kind nodes found for cluster \"c1\".\n")).is_empty());
    }

    #[test]
    fn test_parse_clusters() {
        assert_eq!(parse_clusters(&output("c1\nc2\n")), vec!["c1", "c2"]);
        assert!(parse_clusters(&output("No kind clusters found.\n")).is_empty());
    }

    #[test]
    fn test_missing_control_plane_maps_to_not_found() {
        let error = BackendError::CommandFailed {
            command: "kind get kubeconfig --name c1".to_string(),
            code: Some(1),
            stderr: "ERROR: could not locate any control plane nodes for cluster named 'c1'"
                .to_string(),
        };
        assert!(matches!(
            not_found_as_missing("c1", error),
            BackendError::ClusterNotFound(name) if name == "c1"
        ));
    }

    #[test]
    fn test_wait_is_at_least_one_second() {
        assert_eq!(wait_arg(Duration::from_millis(10)), "1s");
        assert_eq!(wait_arg(Duration::from_secs(90)), "90s");
    }
}
