use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec};
use crate::errors::RestackError;

#[derive(Debug, Clone, PartialEq)]
enum ContainerStatus {
    Running(String),
    Stopped(String),
    NotFound,
}

/// [`ContainerRuntime`] backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, RestackError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RestackError::Container(format!("Failed to connect to Docker: {}", e)))?;
        Ok(Self { docker })
    }

    async fn status(&self, name: &str) -> Result<ContainerStatus, RestackError> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);
        let options = ListContainersOptions { all: true, filters, ..Default::default() };

        let target = format!("/{}", name);
        let containers = self.docker.list_containers(Some(options)).await?;
        let found = containers.into_iter().find(|c| {
            c.names.as_ref().is_some_and(|names| names.iter().any(|n| n == &target))
        });

        Ok(match found {
            Some(c) => {
                let id = c.id.unwrap_or_else(|| name.to_string());
                match c.state.as_deref() {
                    Some("running") => ContainerStatus::Running(id),
                    _ => ContainerStatus::Stopped(id),
                }
            }
            None => ContainerStatus::NotFound,
        })
    }

    fn build_config(spec: &ContainerSpec) -> Config<String> {
        let binds: Vec<String> = spec
            .volumes
            .iter()
            .map(|v| format!("{}:{}", v.host.display(), v.container))
            .collect();

        let mut exposed_ports = HashMap::new();
        let mut port_bindings = HashMap::new();
        for p in &spec.ports {
            let key = format!("{}/tcp", p.container_port);
            exposed_ports.insert(key.clone(), HashMap::new());
            port_bindings.insert(
                key,
                Some(vec![PortBinding {
                    host_ip: Some("127.0.0.1".to_string()),
                    host_port: Some(p.host_port.to_string()),
                }]),
            );
        }

        let host_config = HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            ..Default::default()
        };

        Config {
            image: Some(spec.image.clone()),
            entrypoint: spec.entrypoint.clone(),
            cmd: Some(spec.cmd.clone()),
            working_dir: spec.working_dir.clone(),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

/// 304 (already stopped) and 404 (gone) count as success for teardown calls.
fn tolerate_gone(result: Result<(), bollard::errors::Error>) -> Result<(), RestackError> {
    match result {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError { status_code, .. })
            if status_code == 304 || status_code == 404 =>
        {
            Ok(())
        }
        Err(e) => Err(RestackError::Container(e.to_string())),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn start(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RestackError> {
        match self.status(&spec.name).await? {
            ContainerStatus::Running(id) => {
                info!(container = %spec.name, "Reusing running container");
                return Ok(ContainerHandle { id, name: spec.name.clone(), reused: true });
            }
            ContainerStatus::Stopped(_) => {
                info!(container = %spec.name, "Removing stale container before start");
                tolerate_gone(
                    self.docker
                        .remove_container(&spec.name, Some(RemoveContainerOptions { force: true, ..Default::default() }))
                        .await,
                )?;
            }
            ContainerStatus::NotFound => {}
        }

        let options = CreateContainerOptions { name: spec.name.as_str(), platform: None };
        let created = self
            .docker
            .create_container(Some(options), Self::build_config(spec))
            .await
            .map_err(|e| RestackError::Container(format!("Failed to create {}: {}", spec.name, e)))?;

        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RestackError::Container(format!("Failed to start {}: {}", spec.name, e)))?;

        info!(container = %spec.name, image = %spec.image, "Container started");
        Ok(ContainerHandle { id: created.id, name: spec.name.clone(), reused: false })
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RestackError> {
        let options = WaitContainerOptions { condition: "not-running" };
        let mut stream = self.docker.wait_container(&handle.name, Some(options));
        match stream.next().await {
            Some(Ok(resp)) => Ok(resp.status_code),
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(RestackError::Container(format!("Waiting for {} failed: {}", handle.name, e))),
            None => Err(RestackError::Container(format!("No exit status for {}", handle.name))),
        }
    }

    async fn exec(&self, handle: &ContainerHandle, cmd: &[String], working_dir: Option<&str>) -> Result<i64, RestackError> {
        debug!(container = %handle.name, command = %cmd.join(" "), "Executing in container");
        let exec = self
            .docker
            .create_exec(
                &handle.name,
                CreateExecOptions {
                    cmd: Some(cmd.to_vec()),
                    working_dir: working_dir.map(str::to_string),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| RestackError::Container(format!("Failed to create exec in {}: {}", handle.name, e)))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| RestackError::Container(format!("Exec in {} failed: {}", handle.name, e)))?;
        if let StartExecResults::Attached { mut output, .. } = started {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(line) => debug!(container = %handle.name, output = %line, "exec output"),
                    Err(e) => {
                        warn!(container = %handle.name, error = %e, "Exec output stream broke off");
                        break;
                    }
                }
            }
        }

        let inspected = self.docker.inspect_exec(&exec.id).await?;
        inspected
            .exit_code
            .ok_or_else(|| RestackError::Container(format!("No exit code for exec in {}", handle.name)))
    }

    async fn is_running(&self, handle: &ContainerHandle) -> Result<bool, RestackError> {
        Ok(matches!(self.status(&handle.name).await?, ContainerStatus::Running(_)))
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RestackError> {
        tolerate_gone(self.docker.stop_container(&handle.name, Some(StopContainerOptions { t: 10 })).await)?;
        debug!(container = %handle.name, "Container stopped");
        Ok(())
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RestackError> {
        tolerate_gone(
            self.docker
                .remove_container(&handle.name, Some(RemoveContainerOptions { force: true, ..Default::default() }))
                .await,
        )?;
        debug!(container = %handle.name, "Container removed");
        Ok(())
    }
}
