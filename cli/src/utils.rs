use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use kind_backend::{ContainerEngine, KindCli};
use kind_common::{ClusterController, ImageDistributor};
use kind_defs::{ClusterRecord, ClusterSpec, KindError};
use serde::Serialize;

pub type Controller = ClusterController<KindCli>;
pub type Distributor = ImageDistributor<ContainerEngine, ContainerEngine, KindCli>;

pub fn controller() -> Result<Controller> {
    let config = kind_utils::controller_config_from_env()?;
    Ok(ClusterController::new(KindCli::from_env(), config))
}

pub fn distributor() -> Distributor {
    let engine = ContainerEngine::from_env();
    ImageDistributor::new(engine.clone(), engine, KindCli::from_env())
}

pub fn read_spec_file(path: &str) -> Result<ClusterSpec> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    parse_spec(&contents).with_context(|| format!("Failed to parse cluster spec {}", path))
}

pub fn parse_spec(contents: &str) -> Result<ClusterSpec> {
    let spec: ClusterSpec = serde_yaml::from_str(contents)?;
    if spec.name.trim().is_empty() {
        return Err(anyhow!("cluster name must not be empty"));
    }
    Ok(spec)
}

pub async fn with_timeout<T, F>(limit: Duration, operation: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T, KindError>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(anyhow!(
            "{} did not finish within {}",
            operation,
            humantime::format_duration(limit)
        )),
    }
}

#[derive(Serialize)]
struct RecordSummary<'a> {
    name: &'a str,
    id: Option<&'a str>,
    state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kubeconfig_path: Option<String>,
}

pub fn summarize(record: &ClusterRecord) -> Result<String> {
    let summary = RecordSummary {
        name: record.name(),
        id: record.id.as_ref().map(|id| id.as_str()),
        state: format!("{:?}", record.state),
        endpoint: record.credentials.as_ref().map(|c| c.endpoint.to_string()),
        kubeconfig_path: record
            .kubeconfig_path
            .as_ref()
            .map(|p| p.display().to_string()),
    };
    Ok(serde_yaml::to_string(&summary)?)
}
