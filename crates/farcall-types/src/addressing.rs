//! Server/client address reconciliation.
//!
//! A service binds on `server_host:server_port` but tells remote callers to
//! dial `client_host:client_port`. The two differ behind NAT or a firewall,
//! where the bound address is unreachable from outside.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Fallback host when the local address cannot be determined.
const FALLBACK_HOST: &str = "127.0.0.1";

/// The four address values, after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressing {
    /// Host the listener binds to.
    pub server_host: String,
    /// Port the listener binds to; 0 until an anonymous bind has happened.
    pub server_port: u16,
    /// Host remote callers are told to dial. Never empty.
    pub client_host: String,
    /// Port remote callers are told to dial; 0 means "the nominal port".
    pub client_port: u16,
}

/// Addressing shared by the listener factory and everything that exports.
pub type SharedAddressing = Arc<RwLock<Addressing>>;

impl Addressing {
    /// Fill in omitted values.
    ///
    /// - `server_host` defaults to the local host address
    /// - `client_host` defaults to `server_host`
    /// - `server_port` defaults to `client_port`, else 0 (any free port)
    /// - `client_port` defaults to `server_port`
    pub fn reconcile(
        server_host: Option<String>,
        server_port: u16,
        client_host: Option<String>,
        client_port: u16,
    ) -> Self {
        let server_host = server_host
            .filter(|h| !h.is_empty())
            .unwrap_or_else(local_host_name);
        let client_host = client_host
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| server_host.clone());
        let server_port = if server_port != 0 {
            server_port
        } else {
            client_port
        };
        let client_port = if client_port != 0 {
            client_port
        } else {
            server_port
        };
        Self {
            server_host,
            server_port,
            client_host,
            client_port,
        }
    }

    /// Loopback addressing on an anonymous port, for tests and local tools.
    pub fn loopback() -> Self {
        Self::reconcile(Some(FALLBACK_HOST.to_string()), 0, None, 0)
    }

    /// Record a completed bind on `bound_port`.
    ///
    /// An anonymous server port takes the bound port. A client port that is
    /// still unset follows the server port; an explicit one is kept.
    pub fn after_bind(&self, bound_port: u16) -> Self {
        let mut next = self.clone();
        if next.server_port == 0 {
            next.server_port = bound_port;
        }
        if next.client_port == 0 {
            next.client_port = next.server_port;
        }
        next
    }

    /// Wrap in the shared handle passed to factories.
    pub fn shared(self) -> SharedAddressing {
        Arc::new(RwLock::new(self))
    }
}

impl Default for Addressing {
    fn default() -> Self {
        Self::reconcile(None, 0, None, 0)
    }
}

/// The address of this host as other machines would see it.
pub fn local_host_name() -> String {
    match local_ip_address::local_ip() {
        Ok(ip) => ip.to_string(),
        Err(_) => FALLBACK_HOST.to_string(),
    }
}
