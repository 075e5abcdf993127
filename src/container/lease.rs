use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::runtime::{ContainerHandle, ContainerRuntime};

/// Scoped ownership of a container started for one session.
///
/// Teardown (stop, remove, delete the session working directory) runs
/// exactly once: either through [`ContainerLease::release`] or, if the
/// owner never got that far, from `Drop` on the current tokio runtime.
/// Failures are logged and swallowed.
pub struct ContainerLease {
    runtime: Arc<dyn ContainerRuntime>,
    handle: ContainerHandle,
    workdir: Option<PathBuf>,
    released: AtomicBool,
}

impl ContainerLease {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, handle: ContainerHandle, workdir: Option<PathBuf>) -> Self {
        Self { runtime, handle, workdir, released: AtomicBool::new(false) }
    }

    pub fn handle(&self) -> &ContainerHandle {
        &self.handle
    }

    pub async fn release(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        teardown(self.runtime.clone(), self.handle.clone(), self.workdir.clone()).await;
    }
}

impl Drop for ContainerLease {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        let runtime = self.runtime.clone();
        let handle = self.handle.clone();
        let workdir = self.workdir.take();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(teardown(runtime, handle, workdir));
            }
            Err(_) => warn!(container = %handle.name, "No runtime available, container left behind"),
        }
    }
}

async fn teardown(runtime: Arc<dyn ContainerRuntime>, handle: ContainerHandle, workdir: Option<PathBuf>) {
    // A reused container belongs to whoever started it.
    if !handle.reused {
        if let Err(e) = runtime.stop(&handle).await {
            warn!(container = %handle.name, error = %e, "Failed to stop container");
        }
        if let Err(e) = runtime.remove(&handle).await {
            warn!(container = %handle.name, error = %e, "Failed to remove container");
        }
    }
    if let Some(dir) = workdir {
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %dir.display(), error = %e, "Failed to delete session working directory");
            }
        }
    }
    info!(container = %handle.name, "Container torn down");
}
