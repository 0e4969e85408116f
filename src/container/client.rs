//! Docker/Podman engine backed by bollard.
//!
//! Connects to the local Docker daemon and falls back to the rootless and
//! system Podman sockets. Not-found responses on lookups are mapped to `None`.

use crate::container::config::ContainerCreateParameters;
use crate::container::engine::{ContainerMetadata, Engine};
use crate::container::{ContainerError, Result};
use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use futures::stream::StreamExt;
use tracing::{debug, info};

/// Socket connection timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// [`Engine`] talking to a Docker-compatible API.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to Docker, or Podman when Docker is unavailable.
    ///
    /// # Errors
    ///
    /// Returns error if no runtime is reachable or the ping fails.
    pub async fn new() -> Result<Self> {
        let engine = Self {
            docker: Self::connect()?,
        };
        engine.ping().await?;
        Ok(engine)
    }

    /// Wrap an existing bollard client.
    pub fn with_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Tries in order:
    /// 1. Local defaults (`DOCKER_HOST`, Unix socket or Windows named pipe)
    /// 2. Rootless Podman socket
    /// 3. System Podman socket
    fn connect() -> Result<Docker> {
        debug!("Attempting to connect to container runtime...");

        match Docker::connect_with_local_defaults() {
            Ok(docker) => {
                info!("Connected to container runtime via local defaults");
                return Ok(docker);
            }
            Err(e) => debug!("Local defaults failed: {}", e),
        }

        #[cfg(unix)]
        {
            let mut sockets = Vec::new();
            if let Ok(home) = std::env::var("HOME") {
                sockets.push(format!("unix://{}/run/podman/podman.sock", home));
            }
            sockets.push("unix:///run/podman/podman.sock".to_string());

            for socket in sockets {
                debug!("Trying Podman socket: {}", socket);
                match Docker::connect_with_socket(
                    &socket,
                    CONNECT_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                ) {
                    Ok(docker) => {
                        info!("Connected to Podman via {}", socket);
                        return Ok(docker);
                    }
                    Err(e) => debug!("Podman socket {} failed: {}", socket, e),
                }
            }
        }

        Err(ContainerError::Other(
            "Failed to connect to Docker or Podman. Please ensure Docker or Podman is installed and running.".to_string(),
        ))
    }

    /// Ping the container runtime to verify connectivity.
    ///
    /// # Errors
    ///
    /// Returns error if ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await.map_err(|e| {
            ContainerError::Other(format!("Failed to ping container runtime: {}", e))
        })?;
        debug!("Container runtime ping successful");
        Ok(())
    }
}

fn is_not_found(err: &BollardError) -> bool {
    matches!(
        err,
        BollardError::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

#[async_trait]
impl Engine for DockerEngine {
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerMetadata>> {
        let inspect = match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let id = inspect
            .id
            .ok_or_else(|| ContainerError::Other(format!("Container {} has no ID", name)))?;
        let labels = inspect
            .config
            .and_then(|config| config.labels)
            .unwrap_or_default();
        let (running, status) = match inspect.state {
            Some(state) => (
                state.running.unwrap_or(false),
                state.status.map(|s| s.to_string()),
            ),
            None => (false, None),
        };

        Ok(Some(ContainerMetadata {
            id,
            labels,
            running,
            status,
        }))
    }

    async fn create_container(&self, params: &ContainerCreateParameters) -> Result<String> {
        let mut options = CreateContainerOptionsBuilder::default().name(&params.name);
        if let Some(platform) = &params.platform {
            options = options.platform(&platform.to_string());
        }

        debug!("Creating container: {}", params.name);
        let response = self
            .docker
            .create_container(Some(options.build()), params.to_body())
            .await?;

        info!("Created container: {} ({})", params.name, response.id);
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        debug!("Starting container: {}", id);
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        debug!("Stopping container: {}", id);
        self.docker
            .stop_container(id, None::<StopContainerOptions>)
            .await?;
        info!("Stopped container: {}", id);
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        debug!("Removing container: {}", id);
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await?;
        info!("Removed container: {}", id);
        Ok(())
    }

    async fn inspect_image(&self, reference: &str) -> Result<Option<String>> {
        match self.docker.inspect_image(reference).await {
            Ok(image) => Ok(image.id),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(ContainerError::ApiError(e)),
        }
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        info!("Pulling image: {}", reference);

        let options = CreateImageOptionsBuilder::default()
            .from_image(reference)
            .build();
        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            let progress = result?;
            if let Some(status) = progress.status {
                debug!("Pull: {}", status);
            }
            if let Some(error) = progress.error {
                return Err(ContainerError::Other(format!(
                    "Pull of {} failed: {}",
                    reference, error
                )));
            }
        }

        info!("Pulled image: {}", reference);
        Ok(())
    }
}
