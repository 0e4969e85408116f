//! Container creation parameters.
//!
//! Compiles a [`RunSpec`] plus an image reference and the resolved run flags
//! into the complete parameter set for the engine's create call. Compilation
//! either succeeds with a fully populated value or fails with an error naming
//! the offending field; no partial parameters are ever returned.

use crate::config::{HealthCheckSpec, MountSpec, RunSpec};
use crate::container::fingerprint::FINGERPRINT_LABEL;
use crate::container::network::NetworkSettings;
use crate::container::parse::{
    Platform, parse_dns, parse_duration, parse_platform, parse_restart_policy, parse_tmpfs,
};
use crate::container::resources::{ResourceLimits, shm_size};
use crate::container::{ContainerError, Result};
use bollard::models::{
    ContainerCreateBody, HealthConfig, HostConfig, HostConfigLogConfig, Mount, MountTypeEnum,
    NetworkingConfig,
};
use std::collections::HashMap;
use std::time::Duration;

pub const STOP_GRACE_PERIOD_FIELD: &str = "run.stop_grace_period";
pub const HEALTHCHECK_INTERVAL_FIELD: &str = "run.healthcheck.interval";
pub const HEALTHCHECK_TIMEOUT_FIELD: &str = "run.healthcheck.timeout";
pub const HEALTHCHECK_START_PERIOD_FIELD: &str = "run.healthcheck.start_period";
pub const HEALTHCHECK_START_INTERVAL_FIELD: &str = "run.healthcheck.start_interval";

/// Engine sentinel disabling any image-defined health check.
const HEALTHCHECK_DISABLED: &str = "NONE";

/// Run flags resolved from the tri-state fields of a [`RunSpec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedRunFlags {
    pub tty: bool,
    pub stdin_open: bool,
    pub auto_remove: bool,
    /// Attach after start; not part of the create parameters
    pub attach: bool,
}

impl ResolvedRunFlags {
    /// Resolve flags, treating unset values as `false`.
    pub fn from_run(run: &RunSpec) -> Self {
        Self {
            tty: run.tty.unwrap_or(false),
            stdin_open: run.stdin_open.unwrap_or(false),
            auto_remove: run.auto_remove.unwrap_or(false),
            attach: run.attach.unwrap_or(false),
        }
    }
}

/// Everything the engine's create call needs.
#[derive(Debug, Clone)]
pub struct ContainerCreateParameters {
    /// Container name
    pub name: String,
    /// Process configuration; host and networking configuration live alongside
    pub config: ContainerCreateBody,
    pub host_config: HostConfig,
    /// `None` leaves the engine's default networking in place
    pub networking_config: Option<NetworkingConfig>,
    pub platform: Option<Platform>,
}

impl ContainerCreateParameters {
    /// Request body combining process, host and networking configuration.
    pub fn to_body(&self) -> ContainerCreateBody {
        ContainerCreateBody {
            host_config: Some(self.host_config.clone()),
            networking_config: self.networking_config.clone(),
            ..self.config.clone()
        }
    }

    /// Label value stored under `key`.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.config
            .labels
            .as_ref()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }
}

/// Compile a run specification into container creation parameters.
///
/// # Arguments
///
/// * `name` - Container name
/// * `run` - Run specification of the alias
/// * `image_ref` - Resolved image reference
/// * `fingerprint` - Digest stored under [`FINGERPRINT_LABEL`]
/// * `flags` - Resolved tty / stdin / auto-remove flags
///
/// # Errors
///
/// Returns a field-qualified error for the first malformed value.
pub fn build_create_parameters(
    name: &str,
    run: &RunSpec,
    image_ref: &str,
    fingerprint: &str,
    flags: &ResolvedRunFlags,
) -> Result<ContainerCreateParameters> {
    let resources = ResourceLimits::build(run.resources.as_ref(), &run.ulimits, &run.devices)?;
    let mut host_config = build_host_config(run, resources, flags.auto_remove)?;

    let network = NetworkSettings::build(&run.ports, &run.expose, &run.networks)?;
    host_config.port_bindings = network.port_bindings();

    let stop_timeout = parse_duration(run.stop_grace_period.as_deref(), STOP_GRACE_PERIOD_FIELD)?
        .map(|d| d.as_secs() as i64);

    let healthcheck = match &run.healthcheck {
        Some(spec) => Some(build_healthcheck(spec)?),
        None => None,
    };

    let platform = match run.platform.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Some(parse_platform(value)?),
        _ => None,
    };

    let config = ContainerCreateBody {
        image: Some(image_ref.to_string()),
        user: user_spec(run),
        env: non_empty(env_list(&run.env)),
        working_dir: run.work_dir.clone(),
        entrypoint: run.entrypoint.clone(),
        cmd: run.cmd.clone(),
        hostname: run.hostname.clone(),
        domainname: run.domain_name.clone(),
        tty: Some(flags.tty),
        open_stdin: Some(flags.stdin_open),
        // Always on, whether or not the caller attaches after start.
        attach_stdin: Some(true),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        exposed_ports: network.exposed_ports(),
        labels: Some(merge_labels(&run.labels, fingerprint)),
        stop_signal: run.stop_signal.clone(),
        stop_timeout,
        healthcheck,
        ..Default::default()
    };

    Ok(ContainerCreateParameters {
        name: name.to_string(),
        config,
        host_config,
        networking_config: network.networking,
        platform,
    })
}

/// Effective user: explicit `user` wins, then `uid:gid` when both are positive.
pub fn user_spec(run: &RunSpec) -> Option<String> {
    if let Some(user) = run.user.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        return Some(user.to_string());
    }
    match (run.uid, run.gid) {
        (Some(uid), Some(gid)) if uid > 0 && gid > 0 => Some(format!("{}:{}", uid, gid)),
        _ => None,
    }
}

/// Render an environment map as `KEY=VALUE` entries.
pub fn env_list(env: &HashMap<String, String>) -> Vec<String> {
    let mut entries: Vec<String> = env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    entries.sort();
    entries
}

/// Map mount specs onto engine mounts.
pub fn to_engine_mounts(mounts: &[MountSpec]) -> Vec<Mount> {
    mounts
        .iter()
        .map(|mount| match mount {
            MountSpec::Bind {
                source,
                target,
                read_only,
            } => Mount {
                typ: Some(MountTypeEnum::BIND),
                source: Some(source.clone()),
                target: Some(target.clone()),
                read_only: Some(*read_only),
                ..Default::default()
            },
            MountSpec::Volume {
                source,
                target,
                read_only,
            } => Mount {
                typ: Some(MountTypeEnum::VOLUME),
                source: Some(source.clone()),
                target: Some(target.clone()),
                read_only: Some(*read_only),
                ..Default::default()
            },
            MountSpec::Tmpfs { target, .. } => Mount {
                typ: Some(MountTypeEnum::TMPFS),
                target: Some(target.clone()),
                ..Default::default()
            },
        })
        .collect()
}

/// User labels plus the fingerprint, which always wins on collision.
fn merge_labels(labels: &HashMap<String, String>, fingerprint: &str) -> HashMap<String, String> {
    let mut merged = labels.clone();
    merged.insert(FINGERPRINT_LABEL.to_string(), fingerprint.to_string());
    merged
}

fn build_host_config(
    run: &RunSpec,
    resources: ResourceLimits,
    auto_remove: bool,
) -> Result<HostConfig> {
    let mounts = to_engine_mounts(&run.volumes);

    let mut host_config = HostConfig {
        auto_remove: Some(auto_remove),
        privileged: Some(run.privileged),
        network_mode: run.network_mode.clone(),
        extra_hosts: non_empty(run.extra_hosts.clone()),
        mounts: non_empty(mounts),
        readonly_rootfs: Some(run.read_only),
        cap_add: non_empty(run.cap_add.clone()),
        cap_drop: non_empty(run.cap_drop.clone()),
        security_opt: non_empty(run.security_opt.clone()),
        sysctls: if run.sysctls.is_empty() {
            None
        } else {
            Some(run.sysctls.clone())
        },
        group_add: non_empty(run.group_add.clone()),
        runtime: run.runtime.clone(),
        ..Default::default()
    };
    resources.apply(&mut host_config);

    if !run.dns.is_empty() {
        let dns = parse_dns(&run.dns)?;
        host_config.dns = non_empty(dns.iter().map(ToString::to_string).collect());
    }
    host_config.dns_options = non_empty(run.dns_options.clone());
    host_config.dns_search = non_empty(run.dns_search.clone());

    host_config.ipc_mode = non_blank(&run.ipc);
    host_config.pid_mode = non_blank(&run.pid);
    host_config.uts_mode = non_blank(&run.uts);

    if !run.tmpfs.is_empty() {
        let tmpfs = parse_tmpfs(&run.tmpfs)?;
        if !tmpfs.is_empty() {
            host_config.tmpfs = Some(tmpfs);
        }
    }

    if let Some(logging) = &run.logging {
        host_config.log_config = Some(HostConfigLogConfig {
            typ: logging.driver.clone(),
            config: if logging.options.is_empty() {
                None
            } else {
                Some(logging.options.clone())
            },
            ..Default::default()
        });
    }

    if let Some(restart) = run.restart.as_deref().filter(|r| !r.trim().is_empty()) {
        host_config.restart_policy = Some(parse_restart_policy(restart)?);
    }

    host_config.shm_size = shm_size(run.resources.as_ref())?;

    Ok(host_config)
}

fn build_healthcheck(spec: &HealthCheckSpec) -> Result<HealthConfig> {
    if spec.disable {
        return Ok(HealthConfig {
            test: Some(vec![HEALTHCHECK_DISABLED.to_string()]),
            ..Default::default()
        });
    }

    Ok(HealthConfig {
        test: spec.test.as_ref().map(|t| t.to_engine()),
        interval: duration_nanos(spec.interval.as_deref(), HEALTHCHECK_INTERVAL_FIELD)?,
        timeout: duration_nanos(spec.timeout.as_deref(), HEALTHCHECK_TIMEOUT_FIELD)?,
        retries: spec.retries,
        start_period: duration_nanos(spec.start_period.as_deref(), HEALTHCHECK_START_PERIOD_FIELD)?,
        start_interval: duration_nanos(
            spec.start_interval.as_deref(),
            HEALTHCHECK_START_INTERVAL_FIELD,
        )?,
        ..Default::default()
    })
}

fn duration_nanos(value: Option<&str>, field: &str) -> Result<Option<i64>> {
    parse_duration(value, field)?
        .map(|d: Duration| {
            i64::try_from(d.as_nanos()).map_err(|_| {
                ContainerError::invalid_field(field, format!("duration {:?} is too long", d))
            })
        })
        .transpose()
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() { None } else { Some(values) }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.trim().is_empty()).map(str::to_string)
}
