use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("cluster \"{0}\" not found")]
    ClusterNotFound(String),

    #[error("image \"{0}\" not found")]
    ImageNotFound(String),

    #[error("command `{command}` failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unexpected output from `{command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum KindError {
    #[error("failed to materialize raw cluster config: {0}")]
    Translation(String),

    #[error("malformed config fragment: {0}")]
    MalformedConfig(String),

    #[error("failed to create cluster \"{name}\": {source}")]
    BackendCreate {
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to delete cluster \"{name}\": {source}")]
    BackendDelete {
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to read cluster \"{name}\": {reason}")]
    BackendRead { name: String, reason: String },

    #[error("image \"{image}\" not present locally: {reason}")]
    ImageNotFound { image: String, reason: String },

    #[error("no nodes found for cluster \"{0}\"")]
    ClusterNotFound(String),

    #[error("failed to save image \"{image}\": {source}")]
    ImageSave {
        image: String,
        #[source]
        source: BackendError,
    },

    #[error("failed to load image onto node \"{node}\": {source}")]
    NodePush {
        node: String,
        #[source]
        source: BackendError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
