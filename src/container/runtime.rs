use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::{poll_until, PollPolicy, RestackError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub host: PathBuf,
    pub container: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

/// Everything needed to launch one tool container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub image: String,
    /// Logical name; a running container with this name is reused.
    pub name: String,
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Vec<String>,
    pub working_dir: Option<String>,
    pub volumes: Vec<VolumeMount>,
    pub ports: Vec<PortMapping>,
    pub env: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    /// True when `start` found the container already running.
    pub reused: bool,
}

/// Capability over the container engine. Adapters only ever talk to this.
///
/// `stop` and `remove` are idempotent: a container that is already gone
/// or already stopped is not an error.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Start a container. A running container with the same name is reused;
    /// a stale one that is not running is removed first.
    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RestackError>;

    /// Block until the container exits and return its exit code.
    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RestackError>;

    /// Run `cmd` inside a running container and return its exit code.
    async fn exec(&self, handle: &ContainerHandle, cmd: &[String], working_dir: Option<&str>) -> Result<i64, RestackError>;

    async fn is_running(&self, handle: &ContainerHandle) -> Result<bool, RestackError>;

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RestackError>;

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RestackError>;
}

/// Poll `predicate` until it holds, giving up after the policy's ceiling.
///
/// Returns `Ok(false)` when the budget runs out, or as soon as the container
/// is seen to have exited. Cancellation is propagated as an error.
pub async fn health_poll<F, Fut>(
    runtime: &dyn ContainerRuntime,
    handle: &ContainerHandle,
    policy: PollPolicy,
    cancel: &CancellationToken,
    mut predicate: F,
) -> Result<bool, RestackError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, RestackError>>,
{
    let check_name = format!("health check {}", handle.name);
    let outcome = poll_until(&check_name, policy, cancel, || {
        let check = predicate();
        async move {
            if !runtime.is_running(handle).await? {
                return Ok(Some(false));
            }
            Ok(check.await?.then_some(true))
        }
    })
    .await;

    match outcome {
        Ok(healthy) => {
            debug!(container = %handle.name, healthy, "Health poll finished");
            Ok(healthy)
        }
        Err(RestackError::Timeout(msg)) => {
            debug!(container = %handle.name, reason = %msg, "Health poll budget exhausted");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
