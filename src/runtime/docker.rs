//! Docker Engine implementation of [`ContainerRuntime`] via bollard

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerStateStatusEnum, HostConfig};
use futures::TryStreamExt;
use std::time::Duration;
use tracing::{debug, info};

use super::{ContainerRuntime, RuntimeError, WorkerSpec, WorkerStatus};

const NOT_FOUND: u16 = 404;

/// Talks to the local Docker daemon over its unix socket
pub struct DockerRuntime {
    docker: Docker,
    timeout: Duration,
}

impl DockerRuntime {
    /// Build a client for `socket`. No connection is made until first use.
    pub fn connect(socket: &str, timeout: Duration) -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_unix(socket, timeout.as_secs(), bollard::API_DEFAULT_VERSION)
            .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        Ok(Self { docker, timeout })
    }

    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        info!(image, "Pulling worker image");

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        self.docker
            .create_image(Some(options), None, None)
            .map_err(|e| self.map_error(e))
            .try_for_each(|progress| async move {
                if let Some(status) = progress.status {
                    debug!(status = %status, "Pull progress");
                }
                Ok(())
            })
            .await
    }

    fn map_error(&self, err: DockerError) -> RuntimeError {
        map_error(err, self.timeout)
    }
}

fn map_error(err: DockerError, timeout: Duration) -> RuntimeError {
    match err {
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Api(format!("{status_code}: {message}")),
        DockerError::RequestTimeoutError => RuntimeError::Timeout(timeout),
        other => RuntimeError::Unavailable(other.to_string()),
    }
}

fn is_not_found(err: &DockerError) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError { status_code, .. } if *status_code == NOT_FOUND
    )
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn status(&self, name: &str) -> Result<WorkerStatus, RuntimeError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => {
                let state = details.state.and_then(|state| state.status);
                Ok(match state {
                    Some(ContainerStateStatusEnum::RUNNING) => WorkerStatus::Running,
                    Some(other) => WorkerStatus::Stopped(other.to_string()),
                    None => WorkerStatus::Stopped("unknown".to_string()),
                })
            }
            Err(err) if is_not_found(&err) => Ok(WorkerStatus::NotFound),
            Err(err) => Err(self.map_error(err)),
        }
    }

    async fn launch(&self, spec: &WorkerSpec) -> Result<String, RuntimeError> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let config = ContainerConfig {
            image: Some(spec.image.clone()),
            host_config: Some(HostConfig {
                binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = match self
            .docker
            .create_container(Some(options.clone()), config.clone())
            .await
        {
            Ok(created) => created,
            // Image missing locally: pull once, then retry creation
            Err(err) if is_not_found(&err) => {
                self.pull(&spec.image).await?;
                self.docker
                    .create_container(Some(options), config)
                    .await
                    .map_err(|e| self.map_error(e))?
            }
            Err(err) => return Err(self.map_error(err)),
        };

        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(created.id)
    }

    async fn resume(&self, name: &str) -> Result<(), RuntimeError> {
        self.docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| self.map_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = DockerError::DockerResponseServerError {
            status_code: 404,
            message: "No such container: nlp".to_string(),
        };
        assert!(is_not_found(&err));

        let err = DockerError::DockerResponseServerError {
            status_code: 409,
            message: "Conflict".to_string(),
        };
        assert!(!is_not_found(&err));
    }

    #[test]
    fn test_error_mapping() {
        let timeout = Duration::from_secs(2);

        let err = map_error(
            DockerError::DockerResponseServerError {
                status_code: 500,
                message: "boom".to_string(),
            },
            timeout,
        );
        assert!(matches!(err, RuntimeError::Api(msg) if msg == "500: boom"));

        let err = map_error(DockerError::RequestTimeoutError, timeout);
        assert!(matches!(err, RuntimeError::Timeout(d) if d == timeout));
    }
}
