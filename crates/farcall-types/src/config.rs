//! Node configuration, loaded from TOML.

use crate::addressing::Addressing;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Well-known port of a name table (registry-style locators default to it).
pub const DEFAULT_REGISTRY_PORT: u16 = 1099;

/// Name an item is bound under when a locator omits it.
pub const DEFAULT_ITEM_NAME: &str = "main";

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub addressing: AddressingConfig,
    pub registry: RegistryConfig,
    pub multicast: MulticastConfig,
    /// Directories searched for `/path` locators before the working directory.
    pub resource_roots: Vec<PathBuf>,
}

/// Raw addressing values; omitted entries are reconciled at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AddressingConfig {
    pub server_host: Option<String>,
    pub server_port: u16,
    pub client_host: Option<String>,
    pub client_port: u16,
}

impl AddressingConfig {
    pub fn reconcile(&self) -> Addressing {
        Addressing::reconcile(
            self.server_host.clone(),
            self.server_port,
            self.client_host.clone(),
            self.client_port,
        )
    }
}

/// Discovery registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Port the registry node listens on.
    pub port: u16,
    /// Name the registry is bound under.
    pub name: String,
    /// Sleep between liveness sweeps.
    pub sweep_interval_secs: u64,
    /// Pause between probing successive entries.
    pub probe_pause_secs: u64,
    /// Hop limit of the registry's own announcements.
    pub announce_ttl: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_REGISTRY_PORT,
            name: "registry".to_string(),
            sweep_interval_secs: 3600,
            probe_pause_secs: 300,
            announce_ttl: 200,
        }
    }
}

impl RegistryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn probe_pause(&self) -> Duration {
        Duration::from_secs(self.probe_pause_secs)
    }
}

/// Rendezvous channel used for announcements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MulticastConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Interface to join on; unspecified lets the OS choose.
    pub interface: Ipv4Addr,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::new(239, 255, 42, 99),
            port: 4299,
            interface: Ipv4Addr::UNSPECIFIED,
        }
    }
}
