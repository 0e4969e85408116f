//! Container compilation and lifecycle layer.
//!
//! This module turns a [`RunSpec`](crate::config::RunSpec) into the exact
//! parameters needed to create a container on a Docker/Podman engine, and
//! decides whether an existing container can be reused instead of recreated.
//!
//! ## Architecture
//!
//! - [`parse`]: field parsers for ports, devices, DNS, tmpfs, durations, memory
//!   sizes, platforms and restart policies
//! - [`resources`]: CPU, memory, ulimit and device limits
//! - [`network`]: exposed ports, port bindings and network endpoints
//! - [`config`]: the top-level compiler producing [`ContainerCreateParameters`]
//! - [`fingerprint`]: content hash over the run specification and image identity
//! - [`lifecycle`]: reuse / recreate decision and its execution
//! - [`engine`]: the [`Engine`] capability consumed by the lifecycle layer
//! - [`client`]: bollard-backed [`Engine`] implementation
//!
//! The only durable state is the fingerprint label stored on the container
//! itself ([`FINGERPRINT_LABEL`]).
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cradle::config::RunSpec;
//! use cradle::container::{DockerEngine, EnsureRequest, ResolvedRunFlags, ensure_container};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = DockerEngine::new().await?;
//!     let run = RunSpec::default();
//!     let request = EnsureRequest {
//!         alias: "dev",
//!         name: "cradle-dev",
//!         image_ref: "alpine:latest",
//!         image_id: "sha256:...",
//!         run: &run,
//!         flags: ResolvedRunFlags::from_run(&run),
//!     };
//!     let outcome = ensure_container(&engine, &request).await?;
//!     println!("{}", outcome.id);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod lifecycle;
pub mod network;
pub mod parse;
pub mod resources;

pub use client::DockerEngine;
pub use config::{ContainerCreateParameters, ResolvedRunFlags, build_create_parameters};
pub use engine::{ContainerMetadata, Engine};
pub use fingerprint::{FINGERPRINT_LABEL, run_fingerprint};
pub use lifecycle::{EnsureOutcome, EnsureRequest, LifecycleAction, SlotState, ensure_container};

/// Container layer errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker/Podman API error
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// Container or image not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A run specification field holds a malformed value
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },

    /// Alias missing from configuration
    #[error("Unknown alias {0:?}")]
    UnknownAlias(String),

    /// Fingerprint projection could not be serialized
    #[error("Fingerprint serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

impl ContainerError {
    /// Build a field-qualified validation error.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        ContainerError::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field path of a validation error, if this is one.
    pub fn field(&self) -> Option<&str> {
        match self {
            ContainerError::InvalidField { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
