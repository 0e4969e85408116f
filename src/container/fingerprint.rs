//! Run fingerprints.
//!
//! A fingerprint is the SHA-256 of a canonical JSON projection of the run
//! specification together with the alias, container name and image identity.
//! It is stored on the container under [`FINGERPRINT_LABEL`] and compared on
//! the next run to decide between reuse and recreation.
//!
//! The projection never serializes a hash map directly: maps become key-sorted
//! entry lists and networks are sorted by name, so equal inputs always hash
//! equally regardless of map iteration order.

use crate::config::{
    HealthCheckSpec, MountSpec, NetworkSpec, ResourcesSpec, RunSpec, UlimitSpec,
};
use crate::container::Result;
use crate::container::config::ResolvedRunFlags;
use crate::container::parse::trimmed_non_empty;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Container label holding the run fingerprint.
pub const FINGERPRINT_LABEL: &str = "io.cradle.fingerprint";

#[derive(Serialize)]
struct KeyValue<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct NetworkProjection<'a> {
    name: &'a str,
    aliases: Vec<String>,
}

#[derive(Serialize)]
struct LoggingProjection<'a> {
    driver: Option<&'a str>,
    options: Vec<KeyValue<'a>>,
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    alias: &'a str,
    name: &'a str,
    image_ref: &'a str,
    image_id: &'a str,
    run: RunProjection<'a>,
}

#[derive(Serialize)]
struct RunProjection<'a> {
    uid: Option<u32>,
    gid: Option<u32>,
    user: Option<&'a str>,
    tty: bool,
    stdin_open: bool,
    auto_remove: bool,
    hostname: Option<&'a str>,
    domain_name: Option<&'a str>,
    work_dir: Option<&'a str>,
    env: Vec<KeyValue<'a>>,
    entrypoint: Option<&'a [String]>,
    cmd: Option<&'a [String]>,
    network_mode: Option<&'a str>,
    networks: Vec<NetworkProjection<'a>>,
    ports: Vec<String>,
    expose: Vec<String>,
    extra_hosts: Vec<String>,
    dns: Vec<String>,
    dns_search: Vec<String>,
    dns_opt: Vec<String>,
    ipc: Option<&'a str>,
    pid: Option<&'a str>,
    uts: Option<&'a str>,
    runtime: Option<&'a str>,
    volumes: &'a [MountSpec],
    #[serde(skip_serializing_if = "Option::is_none")]
    resources: Option<&'a ResourcesSpec>,
    privileged: bool,
    read_only: bool,
    cap_add: Vec<String>,
    cap_drop: Vec<String>,
    security_opt: Vec<String>,
    sysctls: Vec<KeyValue<'a>>,
    ulimits: &'a [UlimitSpec],
    tmpfs: Vec<String>,
    devices: Vec<String>,
    group_add: Vec<String>,
    labels: Vec<KeyValue<'a>>,
    stop_signal: Option<&'a str>,
    stop_grace_period: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    healthcheck: Option<&'a HealthCheckSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logging: Option<LoggingProjection<'a>>,
    restart: Option<&'a str>,
    platform: Option<&'a str>,
}

impl<'a> RunProjection<'a> {
    fn new(run: &'a RunSpec, flags: &ResolvedRunFlags) -> Self {
        Self {
            uid: run.uid,
            gid: run.gid,
            user: run.user.as_deref(),
            tty: flags.tty,
            stdin_open: flags.stdin_open,
            auto_remove: flags.auto_remove,
            hostname: run.hostname.as_deref(),
            domain_name: run.domain_name.as_deref(),
            work_dir: run.work_dir.as_deref(),
            env: sorted_entries(&run.env),
            entrypoint: run.entrypoint.as_deref(),
            cmd: run.cmd.as_deref(),
            network_mode: run.network_mode.as_deref(),
            networks: sorted_networks(&run.networks),
            ports: trimmed_non_empty(&run.ports),
            expose: trimmed_non_empty(&run.expose),
            extra_hosts: trimmed_non_empty(&run.extra_hosts),
            dns: trimmed_non_empty(&run.dns),
            dns_search: trimmed_non_empty(&run.dns_search),
            dns_opt: trimmed_non_empty(&run.dns_options),
            ipc: run.ipc.as_deref(),
            pid: run.pid.as_deref(),
            uts: run.uts.as_deref(),
            runtime: run.runtime.as_deref(),
            volumes: &run.volumes,
            resources: run.resources.as_ref(),
            privileged: run.privileged,
            read_only: run.read_only,
            cap_add: trimmed_non_empty(&run.cap_add),
            cap_drop: trimmed_non_empty(&run.cap_drop),
            security_opt: trimmed_non_empty(&run.security_opt),
            sysctls: sorted_entries(&run.sysctls),
            ulimits: &run.ulimits,
            tmpfs: trimmed_non_empty(&run.tmpfs),
            devices: trimmed_non_empty(&run.devices),
            group_add: trimmed_non_empty(&run.group_add),
            labels: sorted_entries(&run.labels),
            stop_signal: run.stop_signal.as_deref(),
            stop_grace_period: run.stop_grace_period.as_deref(),
            healthcheck: run.healthcheck.as_ref(),
            logging: run.logging.as_ref().map(|logging| LoggingProjection {
                driver: logging.driver.as_deref(),
                options: sorted_entries(&logging.options),
            }),
            restart: run.restart.as_deref(),
            platform: run.platform.as_deref(),
        }
    }
}

fn sorted_entries(values: &HashMap<String, String>) -> Vec<KeyValue<'_>> {
    let mut entries: Vec<KeyValue<'_>> = values
        .iter()
        .map(|(key, value)| KeyValue { key, value })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(b.key));
    entries
}

fn sorted_networks(networks: &HashMap<String, NetworkSpec>) -> Vec<NetworkProjection<'_>> {
    let mut entries: Vec<NetworkProjection<'_>> = networks
        .iter()
        .map(|(name, spec)| NetworkProjection {
            name,
            aliases: trimmed_non_empty(&spec.aliases),
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(b.name));
    entries
}

/// Compute the hex-encoded fingerprint of a run.
///
/// The image content ID is hashed alongside the reference so that a moving
/// tag pointing at new content invalidates existing containers.
///
/// # Errors
///
/// Returns [`ContainerError::Serialization`](crate::container::ContainerError::Serialization)
/// if the projection cannot be encoded.
pub fn run_fingerprint(
    alias: &str,
    name: &str,
    image_ref: &str,
    image_id: &str,
    run: &RunSpec,
    flags: &ResolvedRunFlags,
) -> Result<String> {
    let input = FingerprintInput {
        alias,
        name,
        image_ref,
        image_id,
        run: RunProjection::new(run, flags),
    };

    let encoded = serde_json::to_vec(&input)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HealthCheckTest, LogConfigSpec};

    fn fingerprint(run: &RunSpec) -> String {
        run_fingerprint(
            "alias",
            "name",
            "img:tag",
            "sha256:abc",
            run,
            &ResolvedRunFlags::from_run(run),
        )
        .unwrap()
    }

    fn sample_run() -> RunSpec {
        RunSpec {
            env: HashMap::from([("A".to_string(), "1".to_string())]),
            ports: vec!["8080:80".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_deterministic() {
        let run = sample_run();
        let first = fingerprint(&run);
        assert_eq!(first, fingerprint(&run));
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_changes_with_env() {
        let run = sample_run();
        let mut changed = run.clone();
        changed.env.insert("A".to_string(), "2".to_string());
        assert_ne!(fingerprint(&run), fingerprint(&changed));
    }

    #[test]
    fn test_changes_with_flags() {
        let run = sample_run();
        let base = run_fingerprint("a", "n", "i", "id", &run, &ResolvedRunFlags::default()).unwrap();
        let tty = ResolvedRunFlags {
            tty: true,
            ..Default::default()
        };
        let with_tty = run_fingerprint("a", "n", "i", "id", &run, &tty).unwrap();
        assert_ne!(base, with_tty);

        // Attach intent is not part of the container's identity.
        let attach = ResolvedRunFlags {
            attach: true,
            ..Default::default()
        };
        let with_attach = run_fingerprint("a", "n", "i", "id", &run, &attach).unwrap();
        assert_eq!(base, with_attach);
    }

    #[test]
    fn test_image_id_changes_fingerprint() {
        let run = sample_run();
        let flags = ResolvedRunFlags::default();
        let old = run_fingerprint("a", "n", "img:latest", "sha256:old", &run, &flags).unwrap();
        let new = run_fingerprint("a", "n", "img:latest", "sha256:new", &run, &flags).unwrap();
        assert_ne!(old, new);
    }

    #[test]
    fn test_map_insertion_order_irrelevant() {
        let keys: Vec<String> = (0..32).map(|i| format!("KEY_{i}")).collect();

        let mut forward = RunSpec::default();
        for key in &keys {
            forward.env.insert(key.clone(), "v".to_string());
            forward.labels.insert(key.clone(), "v".to_string());
            forward
                .networks
                .insert(key.clone(), NetworkSpec { aliases: vec![key.clone()] });
        }
        forward.logging = Some(LogConfigSpec {
            driver: Some("json-file".to_string()),
            options: keys.iter().map(|k| (k.clone(), "v".to_string())).collect(),
        });

        let mut reverse = RunSpec::default();
        for key in keys.iter().rev() {
            reverse.env.insert(key.clone(), "v".to_string());
            reverse.labels.insert(key.clone(), "v".to_string());
            reverse
                .networks
                .insert(key.clone(), NetworkSpec { aliases: vec![key.clone()] });
        }
        reverse.logging = Some(LogConfigSpec {
            driver: Some("json-file".to_string()),
            options: keys.iter().rev().map(|k| (k.clone(), "v".to_string())).collect(),
        });

        assert_eq!(fingerprint(&forward), fingerprint(&reverse));
    }

    #[test]
    fn test_blank_list_entries_ignored() {
        let run = sample_run();
        let mut padded = run.clone();
        padded.ports = vec![" 8080:80 ".to_string(), "".to_string()];
        assert_eq!(fingerprint(&run), fingerprint(&padded));
    }

    fn full_run() -> RunSpec {
        RunSpec {
            env: HashMap::from([("A".to_string(), "1".to_string())]),
            ports: vec!["8080:80".to_string()],
            dns: vec!["1.1.1.1".to_string()],
            networks: HashMap::from([(
                "front".to_string(),
                NetworkSpec {
                    aliases: vec!["web".to_string()],
                },
            )]),
            volumes: vec![MountSpec::Bind {
                source: "/src".to_string(),
                target: "/work".to_string(),
                read_only: false,
            }],
            resources: Some(ResourcesSpec {
                memory: Some("512m".to_string()),
                ..Default::default()
            }),
            ulimits: vec![UlimitSpec {
                name: "nofile".to_string(),
                soft: 1024,
                hard: 2048,
            }],
            healthcheck: Some(HealthCheckSpec {
                test: Some(HealthCheckTest::Shell("true".to_string())),
                interval: Some("30s".to_string()),
                ..Default::default()
            }),
            logging: Some(LogConfigSpec {
                driver: Some("json-file".to_string()),
                options: HashMap::from([("max-size".to_string(), "10m".to_string())]),
            }),
            restart: Some("no".to_string()),
            platform: Some("linux/amd64".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_each_field_changes_fingerprint() {
        let cases: &[(&str, fn(&mut RunSpec))] = &[
            ("uid/gid", |r| {
                r.uid = Some(1000);
                r.gid = Some(1000);
            }),
            ("user", |r| r.user = Some("app".to_string())),
            ("tty", |r| r.tty = Some(true)),
            ("stdin_open", |r| r.stdin_open = Some(true)),
            ("auto_remove", |r| r.auto_remove = Some(true)),
            ("hostname", |r| r.hostname = Some("box".to_string())),
            ("domain_name", |r| r.domain_name = Some("lan".to_string())),
            ("work_dir", |r| r.work_dir = Some("/work".to_string())),
            ("env", |r| {
                r.env.insert("B".to_string(), "2".to_string());
            }),
            ("entrypoint", |r| r.entrypoint = Some(vec!["/bin/sh".to_string()])),
            ("cmd", |r| r.cmd = Some(vec!["sleep".to_string()])),
            ("network_mode", |r| r.network_mode = Some("host".to_string())),
            ("network aliases", |r| {
                r.networks.insert(
                    "front".to_string(),
                    NetworkSpec {
                        aliases: vec!["api".to_string()],
                    },
                );
            }),
            ("network added", |r| {
                r.networks.insert("back".to_string(), NetworkSpec::default());
            }),
            ("ports", |r| r.ports.push("9090:90".to_string())),
            ("expose", |r| r.expose.push("9000".to_string())),
            ("extra_hosts", |r| r.extra_hosts.push("db:10.0.0.2".to_string())),
            ("dns", |r| r.dns = vec!["8.8.8.8".to_string()]),
            ("dns_search", |r| r.dns_search.push("lan".to_string())),
            ("dns_opt", |r| r.dns_options.push("ndots:1".to_string())),
            ("ipc", |r| r.ipc = Some("host".to_string())),
            ("pid", |r| r.pid = Some("host".to_string())),
            ("uts", |r| r.uts = Some("host".to_string())),
            ("runtime", |r| r.runtime = Some("runc".to_string())),
            ("volume read_only", |r| {
                r.volumes[0] = MountSpec::Bind {
                    source: "/src".to_string(),
                    target: "/work".to_string(),
                    read_only: true,
                };
            }),
            ("volume added", |r| {
                r.volumes.push(MountSpec::Tmpfs {
                    source: None,
                    target: "/scratch".to_string(),
                });
            }),
            ("resources memory", |r| {
                if let Some(resources) = r.resources.as_mut() {
                    resources.memory = Some("1g".to_string());
                }
            }),
            ("resources cpus", |r| {
                if let Some(resources) = r.resources.as_mut() {
                    resources.cpus = Some(1.5);
                }
            }),
            ("privileged", |r| r.privileged = true),
            ("read_only", |r| r.read_only = true),
            ("cap_add", |r| r.cap_add.push("NET_ADMIN".to_string())),
            ("cap_drop", |r| r.cap_drop.push("MKNOD".to_string())),
            ("security_opt", |r| {
                r.security_opt.push("no-new-privileges".to_string())
            }),
            ("sysctls", |r| {
                r.sysctls
                    .insert("net.ipv4.ip_forward".to_string(), "1".to_string());
            }),
            ("ulimits", |r| r.ulimits[0].soft = 4096),
            ("tmpfs", |r| r.tmpfs.push("/run".to_string())),
            ("devices", |r| r.devices.push("/dev/fuse".to_string())),
            ("group_add", |r| r.group_add.push("video".to_string())),
            ("labels", |r| {
                r.labels.insert("team".to_string(), "core".to_string());
            }),
            ("stop_signal", |r| r.stop_signal = Some("SIGINT".to_string())),
            ("stop_grace_period", |r| {
                r.stop_grace_period = Some("5s".to_string())
            }),
            ("healthcheck interval", |r| {
                if let Some(health) = r.healthcheck.as_mut() {
                    health.interval = Some("10s".to_string());
                }
            }),
            ("healthcheck test", |r| {
                if let Some(health) = r.healthcheck.as_mut() {
                    health.test = Some(HealthCheckTest::Exec(vec![
                        "CMD".to_string(),
                        "true".to_string(),
                    ]));
                }
            }),
            ("logging options", |r| {
                if let Some(logging) = r.logging.as_mut() {
                    logging
                        .options
                        .insert("max-size".to_string(), "20m".to_string());
                }
            }),
            ("logging driver", |r| {
                if let Some(logging) = r.logging.as_mut() {
                    logging.driver = Some("local".to_string());
                }
            }),
            ("restart", |r| r.restart = Some("always".to_string())),
            ("platform", |r| r.platform = Some("linux/arm64".to_string())),
        ];

        let base = full_run();
        let base_fingerprint = fingerprint(&base);
        for &(label, mutate) in cases {
            let mut changed = base.clone();
            mutate(&mut changed);
            assert_ne!(changed, base, "{label}: mutation had no effect");
            assert_ne!(
                fingerprint(&changed),
                base_fingerprint,
                "{label}: fingerprint did not change"
            );
        }
    }

    #[test]
    fn test_cosmetic_changes_keep_fingerprint() {
        let cases: &[(&str, fn(&mut RunSpec))] = &[
            ("attach", |r| r.attach = Some(true)),
            ("padded ports", |r| {
                r.ports = vec!["  8080:80\t".to_string(), " ".to_string()]
            }),
            ("padded dns", |r| {
                r.dns = vec!["".to_string(), " 1.1.1.1 ".to_string()]
            }),
            ("blank expose", |r| r.expose = vec!["   ".to_string()]),
            ("padded network aliases", |r| {
                r.networks.insert(
                    "front".to_string(),
                    NetworkSpec {
                        aliases: vec![" web ".to_string(), "".to_string()],
                    },
                );
            }),
        ];

        let base = full_run();
        let base_fingerprint = fingerprint(&base);
        for &(label, mutate) in cases {
            let mut changed = base.clone();
            mutate(&mut changed);
            assert_ne!(changed, base, "{label}: mutation had no effect");
            assert_eq!(
                fingerprint(&changed),
                base_fingerprint,
                "{label}: fingerprint changed"
            );
        }
    }

    #[test]
    fn test_list_order_significant() {
        let mut first = RunSpec::default();
        first.cap_add = vec!["NET_ADMIN".to_string(), "SYS_TIME".to_string()];
        let mut second = RunSpec::default();
        second.cap_add = vec!["SYS_TIME".to_string(), "NET_ADMIN".to_string()];
        assert_ne!(fingerprint(&first), fingerprint(&second));
    }
}
