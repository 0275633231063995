//! Portable references to exported items.

use crate::invoke::ItemId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A host and port pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Where a caller must dial, whatever address the service nominally bound.
///
/// This travels inside every [`RemoteRef`], so the redirection happens at the
/// caller's site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientRoute {
    pub host: String,
    /// 0 keeps the nominal port.
    pub port: u16,
}

impl ClientRoute {
    /// The address actually dialed for a nominal endpoint.
    ///
    /// The nominal host is always replaced; the nominal port only survives
    /// when no client port is configured.
    pub fn target(&self, nominal: &Endpoint) -> Endpoint {
        let port = if self.port != 0 {
            self.port
        } else {
            nominal.port
        };
        Endpoint::new(self.host.clone(), port)
    }
}

/// Everything a process needs to call an exported item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    /// Export id on the origin server.
    pub id: ItemId,
    /// Address the origin server bound.
    pub endpoint: Endpoint,
    /// Address callers are redirected to.
    pub route: ClientRoute,
    /// String form of the item when the reference was produced.
    pub label: String,
}

impl RemoteRef {
    /// The address a caller dials for this reference.
    pub fn dial_target(&self) -> Endpoint {
        self.route.target(&self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_replaces_host_and_port() {
        let route = ClientRoute {
            host: "gateway.example.net".into(),
            port: 5000,
        };
        let target = route.target(&Endpoint::new("10.1.2.3", 41000));
        assert_eq!(target, Endpoint::new("gateway.example.net", 5000));
    }

    #[test]
    fn test_route_keeps_nominal_port_when_unset() {
        let route = ClientRoute {
            host: "gateway.example.net".into(),
            port: 0,
        };
        let target = route.target(&Endpoint::new("10.1.2.3", 41000));
        assert_eq!(target, Endpoint::new("gateway.example.net", 41000));
    }

    #[test]
    fn test_reference_serialization() {
        let reference = RemoteRef {
            id: ItemId::new_v4(),
            endpoint: Endpoint::new("10.0.0.1", 1099),
            route: ClientRoute {
                host: "public".into(),
                port: 0,
            },
            label: "registry".into(),
        };
        let json = serde_json::to_string(&reference).unwrap();
        let back: RemoteRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reference);
        assert_eq!(back.dial_target().to_string(), "public:1099");
    }
}
