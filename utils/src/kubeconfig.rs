use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use kind_defs::ClusterCredentials;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Kubeconfig {
    #[serde(default)]
    current_context: String,
    #[serde(default)]
    contexts: Vec<NamedContext>,
    #[serde(default)]
    clusters: Vec<NamedCluster>,
    #[serde(default)]
    users: Vec<NamedUser>,
}

#[derive(Debug, Deserialize)]
struct NamedContext {
    name: String,
    context: ContextEntry,
}

#[derive(Debug, Deserialize)]
struct ContextEntry {
    cluster: String,
    user: String,
}

#[derive(Debug, Deserialize)]
struct NamedCluster {
    name: String,
    cluster: ClusterEntry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterEntry {
    server: String,
    certificate_authority_data: Option<String>,
    certificate_authority: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct NamedUser {
    name: String,
    user: UserEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UserEntry {
    client_certificate_data: Option<String>,
    client_certificate: Option<PathBuf>,
    client_key_data: Option<String>,
    client_key: Option<PathBuf>,
}

/// Inline `*-data` wins over a file reference, the same way kubectl resolves it.
fn resolve_material(data: Option<&str>, path: Option<&Path>, field: &str) -> Result<Vec<u8>> {
    if let Some(data) = data {
        return STANDARD
            .decode(data.trim())
            .with_context(|| format!("{}-data is not valid base64", field));
    }
    if let Some(path) = path {
        return std::fs::read(path)
            .with_context(|| format!("failed to read {} from {}", field, path.display()));
    }
    Ok(vec![])
}

/// Extracts the credentials of the kubeconfig's `current-context`.
///
/// Other contexts in the same file are ignored, which matters when the blob
/// comes from a shared kubeconfig with several clusters in it.
pub fn credentials_from_kubeconfig(blob: &str) -> Result<ClusterCredentials> {
    let config: Kubeconfig = serde_yaml::from_str(blob).context("failed to parse kubeconfig")?;

    if config.current_context.is_empty() {
        return Err(anyhow!("kubeconfig has no current-context"));
    }

    let context = config
        .contexts
        .iter()
        .find(|c| c.name == config.current_context)
        .ok_or_else(|| anyhow!("context {:?} not found", config.current_context))?;

    let cluster = config
        .clusters
        .iter()
        .find(|c| c.name == context.context.cluster)
        .ok_or_else(|| anyhow!("cluster {:?} not found", context.context.cluster))?;

    let default_user = UserEntry::default();
    let user = config
        .users
        .iter()
        .find(|u| u.name == context.context.user)
        .map(|u| &u.user)
        .unwrap_or(&default_user);

    let endpoint = Url::parse(&cluster.cluster.server)
        .with_context(|| format!("invalid server url {:?}", cluster.cluster.server))?;

    Ok(ClusterCredentials {
        kubeconfig: blob.to_string(),
        client_certificate: resolve_material(
            user.client_certificate_data.as_deref(),
            user.client_certificate.as_deref(),
            "client-certificate",
        )?,
        client_key: resolve_material(
            user.client_key_data.as_deref(),
            user.client_key.as_deref(),
            "client-key",
        )?,
        ca_certificate: resolve_material(
            cluster.cluster.certificate_authority_data.as_deref(),
            cluster.cluster.certificate_authority.as_deref(),
            "certificate-authority",
        )?,
        endpoint,
    })
}
