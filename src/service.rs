//! Alias-level operations: run, stop and status listing.

use crate::config::{Alias, Config, ImagePolicy};
use crate::container::lifecycle::stop_by_name;
use crate::container::{
    ContainerError, Engine, EnsureRequest, LifecycleAction, ResolvedRunFlags, Result,
    ensure_container,
};
use tracing::{debug, info};

/// Status string for an alias without a container.
pub const STATUS_MISSING: &str = "missing";
/// Status string when the engine reports no state.
pub const STATUS_UNKNOWN: &str = "unknown";

/// Result of [`Service::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Container ID
    pub id: String,
    pub auto_remove: bool,
    /// Whether the caller should attach to the container's streams
    pub attach: bool,
    pub tty: bool,
    pub outcome: LifecycleAction,
}

/// One line of [`Service::statuses`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasStatus {
    pub alias: String,
    pub image_ref: String,
    pub image_present: bool,
    pub container_name: String,
    pub container_present: bool,
    pub container_status: String,
}

/// Runs configured aliases against an engine.
pub struct Service<E: Engine> {
    config: Config,
    engine: E,
}

impl<E: Engine> Service<E> {
    pub fn new(config: Config, engine: E) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    fn alias(&self, name: &str) -> Result<&Alias> {
        self.config
            .alias(name)
            .ok_or_else(|| ContainerError::UnknownAlias(name.to_string()))
    }

    /// Container name of an alias: `run.name`, or `cradle-<alias>`.
    pub fn container_name(&self, alias: &str) -> Result<String> {
        let spec = self.alias(alias)?;
        Ok(container_name(alias, spec))
    }

    /// Make the alias image available according to its pull policy.
    ///
    /// Returns the trimmed image reference.
    ///
    /// # Errors
    ///
    /// Returns error for unknown aliases, failed pulls, and missing images
    /// under the `never` policy.
    pub async fn ensure_image(&self, alias: &str) -> Result<String> {
        let spec = self.alias(alias)?;
        let reference = spec.image.reference.trim().to_string();

        let present = self.engine.inspect_image(&reference).await?.is_some();
        debug!(
            "Image {} present: {} (policy {})",
            reference, present, spec.image.policy
        );

        match spec.image.policy {
            ImagePolicy::Always => self.engine.pull_image(&reference).await?,
            ImagePolicy::IfMissing if !present => self.engine.pull_image(&reference).await?,
            ImagePolicy::IfMissing => {}
            ImagePolicy::Never if !present => {
                return Err(ContainerError::NotFound(format!(
                    "image {} (pull policy is never)",
                    reference
                )));
            }
            ImagePolicy::Never => {}
        }

        Ok(reference)
    }

    /// Ensure the alias container is running, reusing it when unchanged.
    ///
    /// # Errors
    ///
    /// Returns error for unknown aliases, image resolution failures, invalid
    /// run specifications and engine failures.
    pub async fn run(&self, alias: &str) -> Result<RunResult> {
        let spec = self.alias(alias)?;
        let image_ref = self.ensure_image(alias).await?;

        let image_id = self.engine.inspect_image(&image_ref).await?.ok_or_else(|| {
            ContainerError::NotFound(format!("image {} after resolution", image_ref))
        })?;

        let name = container_name(alias, spec);
        let flags = ResolvedRunFlags::from_run(&spec.run);
        let request = EnsureRequest {
            alias,
            name: &name,
            image_ref: &image_ref,
            image_id: &image_id,
            run: &spec.run,
            flags,
        };

        let outcome = ensure_container(&self.engine, &request).await?;
        info!("Alias '{}': container {} {}", alias, outcome.id, outcome.action);

        Ok(RunResult {
            id: outcome.id,
            auto_remove: flags.auto_remove,
            attach: flags.attach,
            tty: flags.tty,
            outcome: outcome.action,
        })
    }

    /// Stop the alias container and return its ID.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotFound`] when the container does not exist.
    pub async fn stop(&self, alias: &str) -> Result<String> {
        let name = self.container_name(alias)?;
        let meta = stop_by_name(&self.engine, &name).await?;
        Ok(meta.id)
    }

    /// Image and container status of every alias, sorted by alias name.
    ///
    /// # Errors
    ///
    /// Returns engine errors other than not-found.
    pub async fn statuses(&self) -> Result<Vec<AliasStatus>> {
        let mut statuses = Vec::with_capacity(self.config.aliases.len());

        for (alias, spec) in &self.config.aliases {
            let image_ref = spec.image.reference.trim().to_string();
            let image_present = self.engine.inspect_image(&image_ref).await?.is_some();

            let container_name = container_name(alias, spec);
            let container = self.engine.inspect_container(&container_name).await?;
            let container_status = match &container {
                None => STATUS_MISSING.to_string(),
                Some(meta) => meta
                    .status
                    .clone()
                    .unwrap_or_else(|| STATUS_UNKNOWN.to_string()),
            };

            statuses.push(AliasStatus {
                alias: alias.clone(),
                image_ref,
                image_present,
                container_name,
                container_present: container.is_some(),
                container_status,
            });
        }

        Ok(statuses)
    }
}

fn container_name(alias: &str, spec: &Alias) -> String {
    match spec.run.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("cradle-{}", alias),
    }
}
