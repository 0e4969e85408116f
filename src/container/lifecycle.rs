//! Container reuse and recreation.
//!
//! The fingerprint label on an existing container is the only thing consulted
//! when deciding whether it still matches the current run specification:
//!
//! - no container with the name: create and start
//! - matching fingerprint: start if stopped, keep the ID
//! - stale fingerprint: stop (best effort), force-remove, create and start
//!
//! Destructive steps already issued are not rolled back if a later step fails;
//! the next invocation recreates from whatever state is left.

use crate::config::RunSpec;
use crate::container::config::{ResolvedRunFlags, build_create_parameters};
use crate::container::engine::{ContainerMetadata, Engine};
use crate::container::fingerprint::run_fingerprint;
use crate::container::{ContainerError, Result};
use tracing::{debug, info, warn};

/// State of the container slot for one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    /// No container with the name exists
    Absent,
    /// The container carries the current fingerprint
    Matching { id: String, running: bool },
    /// The container was built from a different specification
    Stale { id: String, running: bool },
}

impl SlotState {
    /// Classify an inspected container against a freshly computed fingerprint.
    pub fn resolve(fingerprint: &str, existing: Option<&ContainerMetadata>) -> Self {
        match existing {
            None => SlotState::Absent,
            Some(meta) if meta.fingerprint() == Some(fingerprint) => SlotState::Matching {
                id: meta.id.clone(),
                running: meta.running,
            },
            Some(meta) => SlotState::Stale {
                id: meta.id.clone(),
                running: meta.running,
            },
        }
    }
}

/// What [`ensure_container`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// No previous container; a new one was created
    Created,
    /// The existing container was kept
    Reused,
    /// A stale container was replaced
    Recreated,
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleAction::Created => write!(f, "created"),
            LifecycleAction::Reused => write!(f, "reused"),
            LifecycleAction::Recreated => write!(f, "recreated"),
        }
    }
}

/// Inputs for [`ensure_container`].
#[derive(Debug, Clone)]
pub struct EnsureRequest<'a> {
    pub alias: &'a str,
    /// Container name
    pub name: &'a str,
    pub image_ref: &'a str,
    /// Resolved image content ID
    pub image_id: &'a str,
    pub run: &'a RunSpec,
    pub flags: ResolvedRunFlags,
}

/// Result of [`ensure_container`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureOutcome {
    /// ID of the running container
    pub id: String,
    pub action: LifecycleAction,
    pub fingerprint: String,
}

/// Make sure a container matching `request` exists and is running.
///
/// Creation parameters are compiled only on the create path.
///
/// # Errors
///
/// Returns engine errors from lookup, remove, create and start, and
/// field-qualified errors when the run specification does not compile.
pub async fn ensure_container<E: Engine + ?Sized>(
    engine: &E,
    request: &EnsureRequest<'_>,
) -> Result<EnsureOutcome> {
    let fingerprint = run_fingerprint(
        request.alias,
        request.name,
        request.image_ref,
        request.image_id,
        request.run,
        &request.flags,
    )?;

    let existing = engine.inspect_container(request.name).await?;
    let state = SlotState::resolve(&fingerprint, existing.as_ref());
    debug!("Container '{}' slot state: {:?}", request.name, state);

    if let SlotState::Matching { id, running } = state {
        if !running {
            info!("Starting existing container '{}' ({})", request.name, id);
            engine.start_container(&id).await?;
        } else {
            debug!("Container '{}' already running", request.name);
        }
        return Ok(EnsureOutcome {
            id,
            action: LifecycleAction::Reused,
            fingerprint,
        });
    }

    // Compiled before any removal so an invalid spec leaves the old container in place.
    let params = build_create_parameters(
        request.name,
        request.run,
        request.image_ref,
        &fingerprint,
        &request.flags,
    )?;

    let action = match state {
        SlotState::Stale { id, running } => {
            info!(
                "Container '{}' ({}) is out of date, recreating",
                request.name, id
            );
            if running {
                stop_best_effort(engine, &id).await;
            }
            engine.remove_container(&id, true).await?;
            LifecycleAction::Recreated
        }
        _ => LifecycleAction::Created,
    };

    info!("Creating container: {}", request.name);
    let id = engine.create_container(&params).await?;
    engine.start_container(&id).await?;
    info!("Container '{}' started ({})", request.name, id);

    Ok(EnsureOutcome {
        id,
        action,
        fingerprint,
    })
}

/// Stop a container, logging instead of failing.
///
/// The container may already be stopping or gone; the force-remove that
/// follows is the authoritative cleanup.
pub async fn stop_best_effort<E: Engine + ?Sized>(engine: &E, id: &str) {
    if let Err(e) = engine.stop_container(id).await {
        warn!("Failed to stop container {} before removal: {}", id, e);
    }
}

/// Stop a container by name.
///
/// # Errors
///
/// Returns [`ContainerError::NotFound`] when no container has the name, and
/// engine errors from the stop call.
pub async fn stop_by_name<E: Engine + ?Sized>(engine: &E, name: &str) -> Result<ContainerMetadata> {
    let meta = engine
        .inspect_container(name)
        .await?
        .ok_or_else(|| ContainerError::NotFound(format!("container '{}'", name)))?;

    if meta.running {
        info!("Stopping container '{}' ({})", name, meta.id);
        engine.stop_container(&meta.id).await?;
    } else {
        debug!("Container '{}' is not running", name);
    }
    Ok(meta)
}
