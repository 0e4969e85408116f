//! Field parsers for run specification values.
//!
//! Each parser turns one scalar or list field into a typed value and rejects
//! malformed input with a [`ContainerError::InvalidField`] naming the field and
//! the offending entry. Blank list entries are skipped.

use crate::container::{ContainerError, Result};
use bollard::models::{DeviceMapping, RestartPolicy, RestartPolicyNameEnum};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::Duration;

pub const PORTS_FIELD: &str = "run.ports";
pub const EXPOSE_FIELD: &str = "run.expose";
pub const DNS_FIELD: &str = "run.dns";
pub const TMPFS_FIELD: &str = "run.tmpfs";
pub const DEVICES_FIELD: &str = "run.devices";
pub const PLATFORM_FIELD: &str = "run.platform";
pub const RESTART_FIELD: &str = "run.restart";

const DEFAULT_DEVICE_PERMISSIONS: &str = "rwm";

static MEMORY_SIZE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+(?:\.\d+)?) ?([kKmMgGtTpP])?[iI]?[bB]?$").expect("valid memory size pattern")
});

static DURATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:\d+(?:\.\d*)?|\.\d+)(?:ns|us|µs|μs|ms|s|m|h))+$")
        .expect("valid duration pattern")
});

static DURATION_COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|μs|ms|s|m|h)")
        .expect("valid duration component pattern")
});

/// Transport protocol of a container port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
            Protocol::Sctp => write!(f, "sctp"),
        }
    }
}

/// A container-side port, rendered as `80/tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Port {
    pub number: u16,
    pub protocol: Protocol,
}

impl Port {
    pub fn tcp(number: u16) -> Self {
        Self {
            number,
            protocol: Protocol::Tcp,
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.number, self.protocol)
    }
}

/// Host side of a port mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Interface to bind; all interfaces when absent
    pub host_ip: Option<IpAddr>,
    /// Port number or `low-high` range
    pub host_port: String,
}

/// Exposed container ports.
pub type PortSet = BTreeSet<Port>;

/// Host bindings per container port, in declaration order.
pub type PortMap = BTreeMap<Port, Vec<PortBinding>>;

/// Target platform constraint, `os/arch[/variant]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    pub variant: Option<String>,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = &self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// Trim every entry and drop the blank ones, keeping order.
pub fn trimmed_non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse port mappings into the exposed set and the host bindings.
///
/// Accepted forms: `container`, `host:container`, `hostIP:host:container` and
/// `[hostIPv6]:host:container`. The container side may carry a `/tcp`, `/udp`
/// or `/sctp` suffix. Several mappings may bind the same container port.
///
/// # Errors
///
/// Returns a `run.ports` error naming the malformed mapping.
pub fn parse_ports(specs: &[String]) -> Result<(PortSet, PortMap)> {
    let mut exposed = PortSet::new();
    let mut bindings = PortMap::new();

    for raw in specs {
        let spec = raw.trim();
        if spec.is_empty() {
            continue;
        }

        let (port, binding) = parse_port_mapping(spec)?;
        exposed.insert(port);
        if let Some(binding) = binding {
            bindings.entry(port).or_default().push(binding);
        }
    }

    Ok((exposed, bindings))
}

/// Add bare container ports to an exposed set.
///
/// # Errors
///
/// Returns a `run.expose` error naming the malformed port.
pub fn add_exposed_ports(exposed: &mut PortSet, extra: &[String]) -> Result<()> {
    for raw in extra {
        let spec = raw.trim();
        if spec.is_empty() {
            continue;
        }
        let port = parse_container_port(spec).map_err(|reason| {
            ContainerError::invalid_field(
                EXPOSE_FIELD,
                format!("invalid expose port {:?}: {}", raw, reason),
            )
        })?;
        exposed.insert(port);
    }
    Ok(())
}

fn parse_port_mapping(spec: &str) -> Result<(Port, Option<PortBinding>)> {
    let (host_ip, host_port, container_port) = split_port_spec(spec).ok_or_else(|| {
        ContainerError::invalid_field(PORTS_FIELD, format!("invalid port mapping {:?}", spec))
    })?;

    let port = parse_container_port(container_port).map_err(|reason| {
        ContainerError::invalid_field(
            PORTS_FIELD,
            format!(
                "invalid container port {:?} in {:?}: {}",
                container_port, spec, reason
            ),
        )
    })?;

    if host_port.is_empty() {
        return Ok((port, None));
    }
    if !is_valid_host_port(host_port) {
        return Err(ContainerError::invalid_field(
            PORTS_FIELD,
            format!("invalid host port {:?} in {:?}", host_port, spec),
        ));
    }

    let host_ip = if host_ip.is_empty() {
        None
    } else {
        Some(host_ip.parse::<IpAddr>().map_err(|e| {
            ContainerError::invalid_field(
                PORTS_FIELD,
                format!("invalid host ip {:?} in {:?}: {}", host_ip, spec, e),
            )
        })?)
    };

    Ok((
        port,
        Some(PortBinding {
            host_ip,
            host_port: host_port.to_string(),
        }),
    ))
}

/// Split into (host ip, host port, container port); empty strings mark absent parts.
fn split_port_spec(spec: &str) -> Option<(&str, &str, &str)> {
    if let Some(bracketed) = spec.strip_prefix('[') {
        let (host_ip, rest) = bracketed.split_once(']')?;
        let rest = rest.strip_prefix(':')?;
        if rest.is_empty() {
            return None;
        }
        let mut parts = rest.split(':');
        let (host_port, container_port) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        return Some((host_ip, host_port, container_port));
    }

    let parts: Vec<&str> = spec.split(':').collect();
    match parts.as_slice() {
        [container] => Some(("", "", container)),
        [host, container] => Some(("", host, container)),
        [ip, host, container] => Some((ip, host, container)),
        _ => None,
    }
}

fn parse_container_port(spec: &str) -> std::result::Result<Port, String> {
    let (number, protocol) = match spec.split_once('/') {
        Some((number, protocol)) => (number, protocol),
        None => (spec, "tcp"),
    };

    let protocol = match protocol.to_ascii_lowercase().as_str() {
        "tcp" => Protocol::Tcp,
        "udp" => Protocol::Udp,
        "sctp" => Protocol::Sctp,
        other => return Err(format!("unknown protocol {:?}", other)),
    };

    let number: u16 = number
        .parse()
        .map_err(|e| format!("invalid port number {:?}: {}", number, e))?;
    if number == 0 {
        return Err("port must be between 1 and 65535".to_string());
    }

    Ok(Port { number, protocol })
}

fn is_valid_host_port(value: &str) -> bool {
    match value.split_once('-') {
        Some((low, high)) => match (low.parse::<u16>(), high.parse::<u16>()) {
            (Ok(low), Ok(high)) => low <= high,
            _ => false,
        },
        None => value.parse::<u16>().is_ok(),
    }
}

/// Parse DNS server addresses, keeping order.
///
/// # Errors
///
/// Returns a `run.dns` error naming the unparsable address.
pub fn parse_dns(specs: &[String]) -> Result<Vec<IpAddr>> {
    let mut addrs = Vec::with_capacity(specs.len());
    for raw in specs {
        let spec = raw.trim();
        if spec.is_empty() {
            continue;
        }
        let addr = spec.parse::<IpAddr>().map_err(|e| {
            ContainerError::invalid_field(DNS_FIELD, format!("invalid dns entry {:?}: {}", raw, e))
        })?;
        addrs.push(addr);
    }
    Ok(addrs)
}

/// Parse `path` or `path:options` tmpfs entries into a path → options map.
///
/// # Errors
///
/// Returns a `run.tmpfs` error when an entry has an empty path.
pub fn parse_tmpfs(specs: &[String]) -> Result<HashMap<String, String>> {
    let mut entries = HashMap::new();
    for raw in specs {
        let spec = raw.trim();
        if spec.is_empty() {
            continue;
        }
        let (path, options) = match spec.split_once(':') {
            Some((path, options)) => (path.trim(), options.trim()),
            None => (spec, ""),
        };
        if path.is_empty() {
            return Err(ContainerError::invalid_field(
                TMPFS_FIELD,
                format!("invalid tmpfs entry {:?}: empty path", raw),
            ));
        }
        entries.insert(path.to_string(), options.to_string());
    }
    Ok(entries)
}

/// Parse `host`, `host:container` or `host:container:permissions` device specs.
///
/// Permissions default to `rwm` and must be a non-empty combination of `r`,
/// `w` and `m`.
///
/// # Errors
///
/// Returns a `run.devices` error for empty paths, bad permissions or a wrong
/// segment count.
pub fn parse_devices(specs: &[String]) -> Result<Vec<DeviceMapping>> {
    let mut devices = Vec::with_capacity(specs.len());
    for raw in specs {
        let spec = raw.trim();
        if spec.is_empty() {
            continue;
        }
        let invalid = |reason: &str| {
            ContainerError::invalid_field(
                DEVICES_FIELD,
                format!("invalid device entry {:?}: {}", raw, reason),
            )
        };

        let parts: Vec<&str> = spec.split(':').collect();
        let (host, container, permissions) = match parts.as_slice() {
            [host] => (*host, *host, DEFAULT_DEVICE_PERMISSIONS),
            [host, container] => (*host, *container, DEFAULT_DEVICE_PERMISSIONS),
            [host, container, permissions] => (*host, *container, *permissions),
            _ => return Err(invalid("expected host[:container[:permissions]]")),
        };

        if host.is_empty() || container.is_empty() {
            return Err(invalid("empty device path"));
        }
        if permissions.is_empty() || !permissions.chars().all(|c| matches!(c, 'r' | 'w' | 'm')) {
            return Err(invalid("permissions must combine r, w and m"));
        }

        devices.push(DeviceMapping {
            path_on_host: Some(host.to_string()),
            path_in_container: Some(container.to_string()),
            cgroup_permissions: Some(permissions.to_string()),
        });
    }
    Ok(devices)
}

/// Parse a duration such as `30s`, `1m30s`, `1.5h` or `250ms`.
///
/// Blank values mean "not set". Negative durations are rejected.
///
/// # Errors
///
/// Returns an error qualified with `field` when the value does not parse or is
/// negative.
pub fn parse_duration(value: Option<&str>, field: &str) -> Result<Option<Duration>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let invalid = |reason: &str| {
        ContainerError::invalid_field(field, format!("invalid duration {:?}: {}", value, reason))
    };

    let (negative, body) = match value.as_bytes()[0] {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };

    let nanos: u128 = if body == "0" {
        0
    } else {
        if !DURATION.is_match(body) {
            return Err(invalid("expected a number followed by ns, us, ms, s, m or h"));
        }
        let mut total: u128 = 0;
        for component in DURATION_COMPONENT.captures_iter(body) {
            let unit = unit_nanos(&component[2]);
            let nanos = component_nanos(&component[1], unit).ok_or_else(|| invalid("out of range"))?;
            total = total
                .checked_add(nanos)
                .ok_or_else(|| invalid("out of range"))?;
        }
        total
    };

    if negative && nanos > 0 {
        return Err(invalid("must be >= 0"));
    }

    let nanos = u64::try_from(nanos).map_err(|_| invalid("out of range"))?;
    Ok(Some(Duration::from_nanos(nanos)))
}

fn unit_nanos(unit: &str) -> u128 {
    match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60_000_000_000,
        _ => 3_600_000_000_000,
    }
}

fn component_nanos(number: &str, unit: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(unit)?;

    // Digits beyond nanosecond precision of an hour cannot change the result.
    let fraction = &fraction[..fraction.len().min(18)];
    if !fraction.is_empty() {
        let numerator: u128 = fraction.parse().ok()?;
        let scale = 10u128.pow(fraction.len() as u32);
        nanos = nanos.checked_add(numerator * unit / scale)?;
    }
    Some(nanos)
}

/// Parse a human-readable memory size such as `512m`, `2g` or `1.5GiB`.
///
/// Suffixes are binary multiples (`1k` = 1024 bytes) and case-insensitive.
///
/// # Errors
///
/// Returns an error qualified with `field` when the value does not parse.
pub fn parse_memory(value: &str, field: &str) -> Result<i64> {
    let invalid = || ContainerError::invalid_field(field, format!("invalid memory size {:?}", value));

    let captures = MEMORY_SIZE.captures(value.trim()).ok_or_else(invalid)?;
    let number: f64 = captures[1].parse().map_err(|_| invalid())?;
    let multiplier: f64 = match captures
        .get(2)
        .map(|m| m.as_str().to_ascii_lowercase())
        .as_deref()
    {
        None => 1.0,
        Some("k") => 1024.0,
        Some("m") => 1024.0 * 1024.0,
        Some("g") => 1024.0 * 1024.0 * 1024.0,
        Some("t") => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
    };

    let bytes = number * multiplier;
    if !bytes.is_finite() || bytes > i64::MAX as f64 {
        return Err(invalid());
    }
    Ok(bytes as i64)
}

/// Parse an `os/arch` or `os/arch/variant` platform string.
///
/// # Errors
///
/// Returns a `run.platform` error for any other shape.
pub fn parse_platform(value: &str) -> Result<Platform> {
    let invalid = || {
        ContainerError::invalid_field(
            PLATFORM_FIELD,
            format!("invalid platform {:?} (expected os/arch[/variant])", value),
        )
    };

    let parts: Vec<&str> = value.trim().split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(invalid());
    }
    match parts.as_slice() {
        [os, arch] => Ok(Platform {
            os: os.to_string(),
            architecture: arch.to_string(),
            variant: None,
        }),
        [os, arch, variant] => Ok(Platform {
            os: os.to_string(),
            architecture: arch.to_string(),
            variant: Some(variant.to_string()),
        }),
        _ => Err(invalid()),
    }
}

/// Parse a restart policy: `no`, `always`, `unless-stopped`, `on-failure` or
/// `on-failure:<max-retries>`.
///
/// # Errors
///
/// Returns a `run.restart` error for unknown policies or a bad retry count.
pub fn parse_restart_policy(value: &str) -> Result<RestartPolicy> {
    let invalid = |reason: &str| {
        ContainerError::invalid_field(
            RESTART_FIELD,
            format!("invalid restart policy {:?}: {}", value, reason),
        )
    };

    let (name, retries) = match value.trim().split_once(':') {
        Some((name, retries)) => (name, Some(retries)),
        None => (value.trim(), None),
    };

    let name = match name {
        "no" => RestartPolicyNameEnum::NO,
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => return Err(invalid("expected no, always, unless-stopped or on-failure")),
    };

    let maximum_retry_count = match retries {
        None => None,
        Some(_) if name != RestartPolicyNameEnum::ON_FAILURE => {
            return Err(invalid("only on-failure accepts a retry count"));
        }
        Some(count) => Some(
            count
                .parse::<i64>()
                .ok()
                .filter(|c| *c >= 0)
                .ok_or_else(|| invalid("retry count must be a non-negative integer"))?,
        ),
    };

    Ok(RestartPolicy {
        name: Some(name),
        maximum_retry_count,
    })
}
