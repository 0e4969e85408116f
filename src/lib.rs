//! # Cradle
//!
//! Compiles declarative container run specifications into engine create
//! parameters and keeps one container per alias in sync with its
//! specification.
//!
//! ## Architecture Overview
//!
//! - **[`config`]**: TOML configuration, alias definitions and validation
//! - **[`container`]**: field parsers, create-parameter assembly, run
//!   fingerprints, the reuse/recreate lifecycle and the bollard engine
//! - **[`service`]**: alias-level run, stop and status listing
//!
//! Each container carries a fingerprint label computed from its run
//! specification and image content ID. A later run reuses the container when
//! the fingerprint still matches and recreates it otherwise; nothing is stored
//! outside the engine.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cradle::{Config, DockerEngine, Service};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("cradle.toml")?;
//!     let engine = DockerEngine::new().await?;
//!     let service = Service::new(config, engine);
//!
//!     let result = service.run("dev").await?;
//!     println!("{} ({})", result.id, result.outcome);
//!     Ok(())
//! }
//! ```

/// Configuration loading and validation.
pub mod config;

/// Container compilation, fingerprinting and lifecycle.
pub mod container;

/// Alias-level orchestration.
pub mod service;

pub use config::{Config, ConfigError, RunSpec};
pub use container::{ContainerError, DockerEngine, Engine};
pub use service::{AliasStatus, RunResult, Service};
