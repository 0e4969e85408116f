//! Container networking assembly.
//!
//! Combines port mappings, extra exposed ports and named-network attachments
//! into the engine's networking structures.

use crate::config::NetworkSpec;
use crate::container::Result;
use crate::container::parse::{PortMap, PortSet, add_exposed_ports, parse_ports, trimmed_non_empty};
use bollard::models::{EndpointSettings, NetworkingConfig, PortBinding};
use std::collections::HashMap;

/// Assembled networking for one container.
#[derive(Debug, Clone, Default)]
pub struct NetworkSettings {
    /// Ports exposed by the container
    pub exposed: PortSet,
    /// Host bindings per container port
    pub bindings: PortMap,
    /// Endpoint per named network; `None` keeps the engine's default networking
    pub networking: Option<NetworkingConfig>,
}

impl NetworkSettings {
    /// Assemble networking from port mappings, extra exposed ports and networks.
    ///
    /// # Errors
    ///
    /// Returns a `run.ports` or `run.expose` error for malformed entries.
    pub fn build(
        ports: &[String],
        expose: &[String],
        networks: &HashMap<String, NetworkSpec>,
    ) -> Result<Self> {
        let (mut exposed, bindings) = parse_ports(ports)?;
        add_exposed_ports(&mut exposed, expose)?;

        Ok(Self {
            exposed,
            bindings,
            networking: networking_config(networks),
        })
    }

    /// Exposed ports in the engine's `{"80/tcp": {}}` shape.
    pub fn exposed_ports(&self) -> Option<HashMap<String, HashMap<(), ()>>> {
        if self.exposed.is_empty() {
            return None;
        }
        Some(
            self.exposed
                .iter()
                .map(|port| (port.to_string(), HashMap::new()))
                .collect(),
        )
    }

    /// Port bindings in the engine's `{"80/tcp": [{HostIp, HostPort}]}` shape.
    pub fn port_bindings(&self) -> Option<HashMap<String, Option<Vec<PortBinding>>>> {
        if self.bindings.is_empty() {
            return None;
        }
        Some(
            self.bindings
                .iter()
                .map(|(port, bindings)| {
                    let bindings = bindings
                        .iter()
                        .map(|b| PortBinding {
                            host_ip: b.host_ip.map(|ip| ip.to_string()),
                            host_port: Some(b.host_port.clone()),
                        })
                        .collect();
                    (port.to_string(), Some(bindings))
                })
                .collect(),
        )
    }
}

/// One endpoint per named network, carrying its aliases.
pub fn networking_config(networks: &HashMap<String, NetworkSpec>) -> Option<NetworkingConfig> {
    if networks.is_empty() {
        return None;
    }

    let endpoints = networks
        .iter()
        .map(|(name, spec)| {
            let aliases = trimmed_non_empty(&spec.aliases);
            let endpoint = EndpointSettings {
                aliases: if aliases.is_empty() { None } else { Some(aliases) },
                ..Default::default()
            };
            (name.clone(), endpoint)
        })
        .collect();

    Some(NetworkingConfig {
        endpoints_config: Some(endpoints),
    })
}
