//! Resource limit assembly.
//!
//! Combines the CPU, memory, ulimit and device inputs of a run specification
//! into a single [`ResourceLimits`] value expressed in engine base units.

use crate::config::{ResourcesSpec, UlimitSpec};
use crate::container::Result;
use crate::container::parse::{parse_devices, parse_memory};
use bollard::models::{DeviceMapping, HostConfig, ResourcesUlimits};

/// Nano-CPU units per CPU.
pub const NANO_CPUS_PER_CPU: f64 = 1_000_000_000.0;

pub const MEMORY_FIELD: &str = "run.resources.memory";
pub const MEMORY_RESERVATION_FIELD: &str = "run.resources.memory_reservation";
pub const MEMORY_SWAP_FIELD: &str = "run.resources.memory_swap";
pub const SHM_SIZE_FIELD: &str = "run.resources.shm_size";

/// Engine resource limits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceLimits {
    pub nano_cpus: Option<i64>,
    pub cpu_shares: Option<i64>,
    pub cpu_quota: Option<i64>,
    pub cpu_period: Option<i64>,
    pub cpuset_cpus: Option<String>,
    pub cpuset_mems: Option<String>,
    /// Bytes
    pub memory: Option<i64>,
    /// Bytes
    pub memory_reservation: Option<i64>,
    /// Bytes; -1 for unlimited swap
    pub memory_swap: Option<i64>,
    pub pids_limit: Option<i64>,
    pub oom_kill_disable: Option<bool>,
    pub cgroup_parent: Option<String>,
    pub ulimits: Vec<ResourcesUlimits>,
    pub devices: Vec<DeviceMapping>,
}

impl ResourceLimits {
    /// Assemble limits from a run specification's resource inputs.
    ///
    /// # Errors
    ///
    /// Returns the first memory or device parse failure, tagged with its field.
    pub fn build(
        spec: Option<&ResourcesSpec>,
        ulimits: &[UlimitSpec],
        devices: &[String],
    ) -> Result<Self> {
        let mut limits = ResourceLimits::default();

        if let Some(spec) = spec {
            limits.nano_cpus = spec
                .cpus
                .filter(|cpus| *cpus > 0.0)
                .map(|cpus| (cpus * NANO_CPUS_PER_CPU) as i64);
            limits.cpu_shares = spec.cpu_shares;
            limits.cpu_quota = spec.cpu_quota;
            limits.cpu_period = spec.cpu_period;
            limits.cpuset_cpus = spec.cpuset_cpus.clone();
            limits.cpuset_mems = spec.cpuset_mems.clone();
            limits.pids_limit = spec.pids_limit;
            limits.oom_kill_disable = spec.oom_kill_disable;
            limits.cgroup_parent = spec.cgroup_parent.clone();

            limits.memory = memory_limit(spec.memory.as_deref(), MEMORY_FIELD)?;
            limits.memory_reservation =
                memory_limit(spec.memory_reservation.as_deref(), MEMORY_RESERVATION_FIELD)?;
            limits.memory_swap = match spec.memory_swap.as_deref().map(str::trim) {
                Some("-1") => Some(-1),
                other => memory_limit(other, MEMORY_SWAP_FIELD)?,
            };
        }

        limits.ulimits = ulimits
            .iter()
            .map(|u| ResourcesUlimits {
                name: Some(u.name.clone()),
                soft: Some(u.soft),
                hard: Some(u.hard),
            })
            .collect();

        limits.devices = parse_devices(devices)?;

        Ok(limits)
    }

    /// Copy the limits onto a host configuration.
    pub fn apply(self, host_config: &mut HostConfig) {
        host_config.nano_cpus = self.nano_cpus;
        host_config.cpu_shares = self.cpu_shares;
        host_config.cpu_quota = self.cpu_quota;
        host_config.cpu_period = self.cpu_period;
        host_config.cpuset_cpus = self.cpuset_cpus;
        host_config.cpuset_mems = self.cpuset_mems;
        host_config.memory = self.memory;
        host_config.memory_reservation = self.memory_reservation;
        host_config.memory_swap = self.memory_swap;
        host_config.pids_limit = self.pids_limit;
        host_config.oom_kill_disable = self.oom_kill_disable;
        host_config.cgroup_parent = self.cgroup_parent;
        if !self.ulimits.is_empty() {
            host_config.ulimits = Some(self.ulimits);
        }
        if !self.devices.is_empty() {
            host_config.devices = Some(self.devices);
        }
    }
}

/// Shared memory size, which the engine keeps on the host configuration.
///
/// # Errors
///
/// Returns a `run.resources.shm_size` error when the size does not parse.
pub fn shm_size(spec: Option<&ResourcesSpec>) -> Result<Option<i64>> {
    memory_limit(
        spec.and_then(|s| s.shm_size.as_deref()),
        SHM_SIZE_FIELD,
    )
}

fn memory_limit(value: Option<&str>, field: &str) -> Result<Option<i64>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) => parse_memory(value, field).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_and_memory_conversion() {
        let spec = ResourcesSpec {
            cpus: Some(1.5),
            cpu_shares: Some(512),
            cpuset_cpus: Some("0-1".to_string()),
            memory: Some("64m".to_string()),
            memory_reservation: Some("32m".to_string()),
            memory_swap: Some("128m".to_string()),
            pids_limit: Some(128),
            ..Default::default()
        };

        let limits = ResourceLimits::build(Some(&spec), &[], &[]).unwrap();
        assert_eq!(limits.nano_cpus, Some(1_500_000_000));
        assert_eq!(limits.cpu_shares, Some(512));
        assert_eq!(limits.cpuset_cpus.as_deref(), Some("0-1"));
        assert_eq!(limits.memory, Some(64 * 1024 * 1024));
        assert_eq!(limits.memory_reservation, Some(32 * 1024 * 1024));
        assert_eq!(limits.memory_swap, Some(128 * 1024 * 1024));
        assert_eq!(limits.pids_limit, Some(128));
    }

    #[test]
    fn test_zero_cpus_left_unset() {
        let spec = ResourcesSpec {
            cpus: Some(0.0),
            ..Default::default()
        };
        let limits = ResourceLimits::build(Some(&spec), &[], &[]).unwrap();
        assert_eq!(limits.nano_cpus, None);
    }

    #[test]
    fn test_unlimited_swap() {
        let spec = ResourcesSpec {
            memory_swap: Some("-1".to_string()),
            ..Default::default()
        };
        let limits = ResourceLimits::build(Some(&spec), &[], &[]).unwrap();
        assert_eq!(limits.memory_swap, Some(-1));
    }

    #[test]
    fn test_memory_errors_carry_field() {
        let cases = [
            (
                ResourcesSpec {
                    memory: Some("bad".to_string()),
                    ..Default::default()
                },
                MEMORY_FIELD,
            ),
            (
                ResourcesSpec {
                    memory_reservation: Some("bad".to_string()),
                    ..Default::default()
                },
                MEMORY_RESERVATION_FIELD,
            ),
            (
                ResourcesSpec {
                    memory_swap: Some("bad".to_string()),
                    ..Default::default()
                },
                MEMORY_SWAP_FIELD,
            ),
        ];

        for (spec, field) in cases {
            let err = ResourceLimits::build(Some(&spec), &[], &[]).unwrap_err();
            assert_eq!(err.field(), Some(field));
        }
    }

    #[test]
    fn test_ulimits_and_devices() {
        let ulimits = vec![UlimitSpec {
            name: "nofile".to_string(),
            soft: 1024,
            hard: 2048,
        }];
        let devices = vec!["/dev/null:/dev/null:rwm".to_string()];

        let limits = ResourceLimits::build(None, &ulimits, &devices).unwrap();
        assert_eq!(limits.ulimits.len(), 1);
        assert_eq!(limits.ulimits[0].hard, Some(2048));
        assert_eq!(limits.devices.len(), 1);

        let mut host_config = HostConfig::default();
        limits.apply(&mut host_config);
        assert_eq!(host_config.ulimits.map(|u| u.len()), Some(1));
        assert_eq!(host_config.devices.map(|d| d.len()), Some(1));
    }

    #[test]
    fn test_shm_size() {
        let spec = ResourcesSpec {
            shm_size: Some("1g".to_string()),
            ..Default::default()
        };
        assert_eq!(shm_size(Some(&spec)).unwrap(), Some(1024 * 1024 * 1024));
        assert_eq!(shm_size(None).unwrap(), None);

        let bad = ResourcesSpec {
            shm_size: Some("huge".to_string()),
            ..Default::default()
        };
        assert_eq!(shm_size(Some(&bad)).unwrap_err().field(), Some(SHM_SIZE_FIELD));
    }
}
