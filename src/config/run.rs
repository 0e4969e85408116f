//! Run specification types.
//!
//! A [`RunSpec`] describes how a named alias should run: identity, process,
//! networking, mounts, resources, security and lifecycle settings. The types
//! here are plain data; the container layer compiles them into engine
//! parameters and fingerprints them.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Declarative per-alias run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSpec {
    /// Numeric user id; only used together with `gid`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    /// Numeric group id; only used together with `uid`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
    /// User spec passed verbatim to the engine; wins over uid/gid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tty: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdin_open: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_remove: Option<bool>,
    /// Attach after start; consumed by the caller only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach: Option<bool>,

    /// Container name (defaults to `cradle-<alias>`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<String>,
    pub env: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,

    /// bridge, host, none or a network name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(deserialize_with = "deserialize_networks")]
    pub networks: HashMap<String, NetworkSpec>,
    /// Port mappings such as `8080:80` or `127.0.0.1:2222:22`
    pub ports: Vec<String>,
    /// Extra container ports exposed without a host binding
    pub expose: Vec<String>,
    pub extra_hosts: Vec<String>,
    pub dns: Vec<String>,
    pub dns_search: Vec<String>,
    #[serde(rename = "dns_opt")]
    pub dns_options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uts: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    pub volumes: Vec<MountSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesSpec>,
    pub privileged: bool,
    pub read_only: bool,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub security_opt: Vec<String>,
    pub sysctls: HashMap<String, String>,
    pub ulimits: Vec<UlimitSpec>,
    /// `path` or `path:options`
    pub tmpfs: Vec<String>,
    /// `host[:container[:permissions]]`
    pub devices: Vec<String>,
    pub group_add: Vec<String>,
    pub labels: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_grace_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthCheckSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LogConfigSpec>,
    /// no, always, unless-stopped, on-failure[:N]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,

    /// Platform override such as `linux/amd64`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

/// Attachment to a named network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSpec {
    pub aliases: Vec<String>,
}

/// A single mount entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum MountSpec {
    /// Host path bind mount
    Bind {
        source: String,
        target: String,
        #[serde(default)]
        read_only: bool,
    },
    /// Named volume
    Volume {
        source: String,
        target: String,
        #[serde(default)]
        read_only: bool,
    },
    /// In-memory filesystem; a `source` is rejected by validation
    Tmpfs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        target: String,
    },
}

impl MountSpec {
    /// Mount point inside the container.
    pub fn target(&self) -> &str {
        match self {
            MountSpec::Bind { target, .. }
            | MountSpec::Volume { target, .. }
            | MountSpec::Tmpfs { target, .. } => target,
        }
    }

    /// Kind name as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            MountSpec::Bind { .. } => "bind",
            MountSpec::Volume { .. } => "volume",
            MountSpec::Tmpfs { .. } => "tmpfs",
        }
    }
}

/// CPU, memory and cgroup limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResourcesSpec {
    /// Fractional CPU count, converted to nano-CPUs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_quota: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_period: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpuset_cpus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpuset_mems: Option<String>,
    /// Human-readable size, e.g. `512m`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_reservation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_swap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pids_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oom_kill_disable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cgroup_parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shm_size: Option<String>,
}

/// A resource limit triple.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UlimitSpec {
    pub name: String,
    pub soft: i64,
    pub hard: i64,
}

/// Health check configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthCheckSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test: Option<HealthCheckTest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_period: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_interval: Option<String>,
    pub disable: bool,
}

/// Health check command, either a shell string or an exec-style list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HealthCheckTest {
    /// Run through the container's shell (`CMD-SHELL`)
    Shell(String),
    /// Engine-native list, e.g. `["CMD", "curl", "-f", "http://localhost"]`
    Exec(Vec<String>),
}

impl HealthCheckTest {
    /// Command list in the engine's format.
    pub fn to_engine(&self) -> Vec<String> {
        match self {
            HealthCheckTest::Shell(cmd) => vec!["CMD-SHELL".to_string(), cmd.clone()],
            HealthCheckTest::Exec(args) => args.clone(),
        }
    }
}

/// Logging driver configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    pub options: HashMap<String, String>,
}

/// Networks may be written as a list of names or as a map of name to settings.
fn deserialize_networks<'de, D>(deserializer: D) -> Result<HashMap<String, NetworkSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Networks {
        Names(Vec<String>),
        Map(HashMap<String, Option<NetworkSpec>>),
    }

    Ok(match Networks::deserialize(deserializer)? {
        Networks::Names(names) => names
            .into_iter()
            .map(|name| (name, NetworkSpec::default()))
            .collect(),
        Networks::Map(map) => map
            .into_iter()
            .map(|(name, spec)| (name, spec.unwrap_or_default()))
            .collect(),
    })
}
