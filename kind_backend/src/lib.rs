mod cmd;
mod docker;
mod kind;

pub use docker::{ContainerEngine, DEFAULT_CONTAINER_ENGINE};
pub use kind::{KindCli, DEFAULT_KIND_BINARY};
