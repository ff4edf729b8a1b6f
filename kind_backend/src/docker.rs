use std::path::Path;

use async_trait::async_trait;
use kind_defs::{BackendError, ImageStore, Node, NodeTransfer};
use log::debug;

use crate::cmd::{command, describe, run_command, CommandOutput, Input};

pub const DEFAULT_CONTAINER_ENGINE: &str = "docker";

/// [`ImageStore`] and [`NodeTransfer`] on top of a docker compatible engine.
/// Node containers are reached with `exec`, and images are imported with
/// containerd's `ctr` inside them.
#[derive(Debug, Clone)]
pub struct ContainerEngine {
    binary: String,
}

impl ContainerEngine {
    pub fn new(binary: &str) -> Self {
        ContainerEngine {
            binary: binary.to_string(),
        }
    }

    /// Uses `KIND_CONTAINER_ENGINE` when set, e.g. `podman`.
    pub fn from_env() -> Self {
        let binary = std::env::var("KIND_CONTAINER_ENGINE")
            .ok()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTAINER_ENGINE.to_string());
        ContainerEngine::new(&binary)
    }
}

fn single_line(command: String, output: &CommandOutput) -> Result<String, BackendError> {
    match output.stdout_lines().as_slice() {
        [line] => Ok(line.to_string()),
        lines => Err(BackendError::UnexpectedOutput {
            command,
            detail: format!("expected 1 line of output, got {}", lines.len()),
        }),
    }
}

fn import_args(node: &Node) -> Vec<&str> {
    vec![
        "exec",
        "--privileged",
        "-i",
        node.name.as_str(),
        "ctr",
        "--namespace=k8s.io",
        "images",
        "import",
        "--all-platforms",
        "--digests",
        "-",
    ]
}

#[async_trait]
impl ImageStore for ContainerEngine {
    async fn inspect_id(&self, reference: &str) -> Result<String, BackendError> {
        let mut exec = command(
            &self.binary,
            &["image", "inspect", "-f", "{{ .Id }}", reference],
        );
        let description = describe(&exec);
        let output = run_command(&mut exec, Input::Null)
            .await
            .map_err(|e| match e {
                BackendError::CommandFailed { ref stderr, .. }
                    if stderr.contains("No such image") =>
                {
                    BackendError::ImageNotFound(reference.to_string())
                }
                other => other,
            })?;
        single_line(description, &output)
    }

    async fn save(&self, reference: &str, destination: &Path) -> Result<(), BackendError> {
        let destination = destination.to_string_lossy().into_owned();
        let mut exec = command(&self.binary, &["save", "-o", destination.as_str(), reference]);
        run_command(&mut exec, Input::Null).await?;
        debug!("Saved {} to {}", reference, destination);
        Ok(())
    }
}

#[async_trait]
impl NodeTransfer for ContainerEngine {
    async fn load_archive(
        &self,
        node: &Node,
        archive: tokio::fs::File,
    ) -> Result<(), BackendError> {
        let archive = archive.into_std().await;
        let mut exec = command(&self.binary, &import_args(node));
        run_command(&mut exec, Input::File(archive)).await?;
        Ok(())
    }

    async fn image_present(
        &self,
        node: &Node,
        reference: &str,
    ) -> Result<Option<String>, BackendError> {
        let mut exec = command(
            &self.binary,
            &[
                "exec",
                node.name.as_str(),
                "crictl",
                "inspecti",
                "-o",
                "go-template",
                "--template",
                "{{.status.id}}",
                reference,
            ],
        );
        match run_command(&mut exec, Input::Null).await {
            Ok(output) => Ok(output
                .stdout_lines()
                .first()
                .map(|id| id.to_string())
                .filter(|id| !id.is_empty())),
            // crictl exits non-zero when the image is unknown to the node.
            Err(BackendError::CommandFailed { stderr, .. }) => {
                debug!("{} not present on {}: {}", reference, node.name, stderr);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn output(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn test_single_line_id() {
        let id = single_line("docker image inspect".to_string(), &output("sha256:abc\n")).unwrap();
        assert_eq!(id, "sha256:abc");
    }

    #[test]
    fn test_multiple_lines_are_unexpected() {
        let err = single_line("docker image inspect".to_string(), &output("a\nb\n")).unwrap_err();
        match err {
            BackendError::UnexpectedOutput { detail, .. } => {
                assert_eq!(detail, "expected 1 line of output, got 2")
            }
            other => panic!("expected UnexpectedOutput, got {:?}", other),
        }
    }

    #[test]
    fn test_import_reads_archive_from_stdin() {
        let node = Node::new("c1-worker");
        let args = import_args(&node);
        assert_eq!(&args[..4], &["exec", "--privileged", "-i", "c1-worker"]);
        assert_eq!(args.last(), Some(&"-"));
    }

    #[test]
    fn test_engine_binary_is_configurable() {
        let engine = ContainerEngine::new("podman");
        let exec = command(&engine.binary, &["save", "-o", "/tmp/images.tar", "myapp:latest"]);
        assert_eq!(describe(&exec), "podman save -o /tmp/images.tar myapp:latest");
    }
}
