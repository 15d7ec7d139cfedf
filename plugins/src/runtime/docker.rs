use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::{StreamExt, TryStreamExt};
use ghostgate_core::api::{ContainerHandle, ContainerRuntime, ExecIo, RuntimeError};

const MANAGED_LABEL: &str = "ghostgate.managed";

/// Local Docker daemon over its default socket.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;
        Ok(Self { docker })
    }

    /// Round-trips to the daemon; used to warn early when it is not reachable.
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))
    }

    async fn ensure_image(&self, image: &str) -> Result<(), RuntimeError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => return Ok(()),
            Err(e) if is_not_found_error(&e) => {}
            Err(e) => return Err(docker_error("inspect_image", image, e)),
        }

        let (from_image, tag) = split_image(image);
        tracing::info!(target: "ghostgate.session", image = %image, "pulling image");
        self.docker
            .create_image(
                Some(CreateImageOptions {
                    from_image: from_image.to_string(),
                    tag: tag.to_string(),
                    ..Default::default()
                }),
                None,
                None,
            )
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| docker_error("pull_image", image, e))?;
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn create(
        &self,
        image: &str,
        command: &[String],
        interactive: bool,
        name: &str,
    ) -> Result<ContainerHandle, RuntimeError> {
        self.ensure_image(image).await?;

        let config = Config {
            image: Some(image.to_string()),
            cmd: Some(command.to_vec()),
            tty: Some(interactive),
            open_stdin: Some(interactive),
            attach_stdin: Some(interactive),
            labels: Some(HashMap::from([(MANAGED_LABEL.to_string(), "true".to_string())])),
            ..Default::default()
        };
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| docker_error("create_container", name, e))?;

        for warning in &created.warnings {
            tracing::warn!(target: "ghostgate.session", container = %name, warning = %warning, "docker warning");
        }
        Ok(ContainerHandle {
            id: created.id,
            name: name.to_string(),
            running: false,
        })
    }

    async fn get(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => Ok(Some(ContainerHandle {
                id: info.id.unwrap_or_default(),
                name: name.to_string(),
                running: info.state.and_then(|s| s.running).unwrap_or(false),
            })),
            Err(e) if is_not_found_error(&e) => Ok(None),
            Err(e) => Err(docker_error("inspect_container", name, e)),
        }
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.docker
            .start_container(&handle.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| docker_error("start_container", &handle.name, e))
    }

    async fn remove(&self, handle: &ContainerHandle, force: bool) -> Result<(), RuntimeError> {
        match self
            .docker
            .remove_container(
                &handle.name,
                Some(RemoveContainerOptions {
                    force,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found_error(&e) => Err(RuntimeError::NotFound(handle.name.clone())),
            Err(e) => Err(docker_error("remove_container", &handle.name, e)),
        }
    }

    async fn exec(
        &self,
        handle: &ContainerHandle,
        command: &[String],
        tty: bool,
    ) -> Result<ExecIo, RuntimeError> {
        let created = self
            .docker
            .create_exec(
                &handle.name,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    attach_stdin: Some(tty),
                    tty: Some(tty),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| docker_error("create_exec", &handle.name, e))?;

        let started = self
            .docker
            .start_exec(
                &created.id,
                Some(StartExecOptions {
                    detach: false,
                    tty,
                    output_capacity: None,
                }),
            )
            .await
            .map_err(|e| docker_error("start_exec", &handle.name, e))?;

        match started {
            StartExecResults::Attached { output, input } => {
                let target = handle.name.clone();
                let output = output.map(move |item| {
                    item.map(|log| log.into_bytes())
                        .map_err(|e| docker_error("exec_output", &target, e))
                });
                Ok(ExecIo {
                    output: Box::pin(output),
                    input,
                })
            }
            StartExecResults::Detached => Err(RuntimeError::operation(
                "start_exec",
                &handle.name,
                "exec started detached",
            )),
        }
    }
}

fn is_not_found_error(error: &BollardError) -> bool {
    matches!(
        error,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Daemon-side rejections are operation failures; anything else means the
/// daemon could not be talked to.
fn docker_error(op: &'static str, target: &str, error: BollardError) -> RuntimeError {
    match error {
        BollardError::DockerResponseServerError { message, .. } => {
            RuntimeError::operation(op, target, message)
        }
        other => RuntimeError::Unavailable(format!("{op} {target}: {other}")),
    }
}

/// `repo[:tag]` with registry ports left intact; the tag defaults to `latest`.
fn split_image(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_image_references() {
        assert_eq!(split_image("ubuntu:24.04"), ("ubuntu", "24.04"));
        assert_eq!(split_image("alpine"), ("alpine", "latest"));
        assert_eq!(
            split_image("localhost:5000/tools/box"),
            ("localhost:5000/tools/box", "latest")
        );
        assert_eq!(
            split_image("localhost:5000/tools/box:1.2"),
            ("localhost:5000/tools/box", "1.2")
        );
    }

    #[test]
    fn server_errors_map_to_operations() {
        let not_found = BollardError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: x".into(),
        };
        assert!(is_not_found_error(&not_found));
        match docker_error("inspect_container", "x", not_found) {
            RuntimeError::Operation { op, target, message } => {
                assert_eq!(op, "inspect_container");
                assert_eq!(target, "x");
                assert!(message.contains("No such container"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let conflict = BollardError::DockerResponseServerError {
            status_code: 409,
            message: "conflict".into(),
        };
        assert!(!is_not_found_error(&conflict));
    }
}
