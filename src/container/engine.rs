//! Engine capability consumed by the lifecycle layer.

use crate::container::Result;
use crate::container::config::ContainerCreateParameters;
use crate::container::fingerprint::FINGERPRINT_LABEL;
use async_trait::async_trait;
use std::collections::HashMap;

/// What the engine reports about an existing container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerMetadata {
    pub id: String,
    pub labels: HashMap<String, String>,
    pub running: bool,
    /// Engine state string such as `running` or `exited`
    pub status: Option<String>,
}

impl ContainerMetadata {
    /// Fingerprint stored on the container, if any.
    pub fn fingerprint(&self) -> Option<&str> {
        self.labels.get(FINGERPRINT_LABEL).map(String::as_str)
    }
}

/// Container engine operations.
///
/// Lookups return `Ok(None)` for objects the engine does not know; every
/// other failure is an error.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Inspect a container by name or ID.
    async fn inspect_container(&self, name: &str) -> Result<Option<ContainerMetadata>>;

    /// Create a container and return its ID.
    async fn create_container(&self, params: &ContainerCreateParameters) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    async fn stop_container(&self, id: &str) -> Result<()>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Content ID of a local image.
    async fn inspect_image(&self, reference: &str) -> Result<Option<String>>;

    /// Pull an image, waiting for the transfer to finish.
    async fn pull_image(&self, reference: &str) -> Result<()>;
}
