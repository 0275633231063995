//! Rendezvous channel for item announcements.
//!
//! The registry needs two things from the channel: a way to announce its
//! own reference and a way to hear everybody else's. [`UdpMulticast`] does
//! both over an IPv4 multicast group, one capsule per datagram.

use crate::capsule::{self, CapsuleError};
use crate::registry::DiscoveryRegistry;

use async_trait::async_trait;
use farcall_types::config::MulticastConfig;
use farcall_types::{Invoke, InvokeResult};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Largest datagram accepted by the listener.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Announcement channel used by the discovery registry.
#[async_trait]
pub trait Multicast: Send + Sync {
    /// Broadcast `item` on the channel with hop limit `ttl`.
    async fn announce(&self, item: &dyn Invoke, ttl: u32) -> InvokeResult<()>;

    /// Start delivering announcements heard on the channel to `registry`.
    async fn listen(&self, registry: DiscoveryRegistry) -> InvokeResult<JoinHandle<()>>;
}

/// IPv4 UDP multicast channel.
#[derive(Debug, Clone)]
pub struct UdpMulticast {
    group: SocketAddrV4,
    interface: Ipv4Addr,
}

impl UdpMulticast {
    pub fn new(config: &MulticastConfig) -> Self {
        Self {
            group: SocketAddrV4::new(config.group, config.port),
            interface: config.interface,
        }
    }

    pub fn group(&self) -> SocketAddrV4 {
        self.group
    }

    fn sender(&self, ttl: u32) -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_multicast_ttl_v4(ttl)?;
        socket.set_multicast_if_v4(&self.interface)?;
        socket.set_multicast_loop_v4(true)?;
        let any: SockAddr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into();
        socket.bind(&any)?;
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    }

    fn receiver(&self) -> std::io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind: SockAddr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.group.port())).into();
        socket.bind(&bind)?;
        socket.join_multicast_v4(self.group.ip(), &self.interface)?;
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    }
}

#[async_trait]
impl Multicast for UdpMulticast {
    async fn announce(&self, item: &dyn Invoke, ttl: u32) -> InvokeResult<()> {
        let bytes = capsule::to_bytes(item)?;
        let socket = self.sender(ttl)?;
        socket.send_to(&bytes, self.group).await?;
        debug!(group = %self.group, ttl, bytes = bytes.len(), "Announced item");
        Ok(())
    }

    async fn listen(&self, registry: DiscoveryRegistry) -> InvokeResult<JoinHandle<()>> {
        let socket = self.receiver()?;
        info!(group = %self.group, "Listening for announcements");
        Ok(tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((n, from)) => {
                        if let Err(e) = handle_datagram(&registry, &buf[..n], from.ip()) {
                            warn!(from = %from, error = %e, "Ignoring bad announcement");
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Announcement receive error");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        }))
    }
}

/// Decode one announcement and register it under the sender's address.
pub fn handle_datagram(
    registry: &DiscoveryRegistry,
    bytes: &[u8],
    sender: IpAddr,
) -> Result<(), CapsuleError> {
    let item = capsule::from_bytes(bytes)?;
    registry.register_from_announcement(sender.to_string(), Arc::new(item));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Dispatcher;
    use crate::registry::{EntrySource, RegistryEntry};
    use crate::server::ItemServer;
    use farcall_types::Addressing;
    use std::time::Duration;

    fn free_udp_port() -> u16 {
        std::net::UdpSocket::bind("0.0.0.0:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn channel_on(port: u16) -> UdpMulticast {
        UdpMulticast::new(&MulticastConfig {
            port,
            ..MulticastConfig::default()
        })
    }

    async fn wait_for_entry(registry: &DiscoveryRegistry) -> Option<(String, RegistryEntry)> {
        for _ in 0..100 {
            if let Some(entry) = registry.entries().into_iter().next() {
                return Some(entry);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        None
    }

    #[test]
    fn test_channel_from_config() {
        let channel = UdpMulticast::new(&MulticastConfig::default());
        assert_eq!(
            channel.group(),
            SocketAddrV4::new(Ipv4Addr::new(239, 255, 42, 99), 4299)
        );
    }

    #[tokio::test]
    async fn test_datagram_registered_under_sender() {
        let (server, _task) = ItemServer::start(Addressing::loopback().shared())
            .await
            .unwrap();
        let handle = server.export_reflect(DiscoveryRegistry::new());
        let bytes = capsule::to_bytes(&handle).unwrap();

        let registry = DiscoveryRegistry::new();
        let sender: IpAddr = "10.1.2.3".parse().unwrap();
        handle_datagram(&registry, &bytes, sender).unwrap();

        let entry = registry.get("10.1.2.3").unwrap();
        assert_eq!(entry.source, EntrySource::Announcement);
        assert_eq!(entry.item.identity(), handle.identity());
    }

    #[test]
    fn test_bad_datagram_rejected() {
        let registry = DiscoveryRegistry::new();
        let sender: IpAddr = "10.1.2.3".parse().unwrap();
        assert!(handle_datagram(&registry, b"noise", sender).is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unexported_item_cannot_be_announced() {
        let channel = UdpMulticast::new(&MulticastConfig::default());
        let local = Dispatcher::reflect(DiscoveryRegistry::new());
        let err = channel.announce(&local, 1).await.unwrap_err();
        assert!(matches!(err, farcall_types::InvokeError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_listener_registers_received_capsule() {
        let port = free_udp_port();
        let registry = DiscoveryRegistry::new();
        let listener = match channel_on(port).listen(registry.clone()).await {
            Ok(task) => task,
            Err(e) => {
                eprintln!("skipping: cannot join the multicast group here: {e}");
                return;
            }
        };

        let (server, _task) = ItemServer::start(Addressing::loopback().shared())
            .await
            .unwrap();
        let handle = server.export_reflect(DiscoveryRegistry::new());
        let bytes = capsule::to_bytes(&handle).unwrap();

        // The listener socket is bound to the group port on every address,
        // so a plain datagram to loopback reaches it too.
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&bytes, ("127.0.0.1", port)).await.unwrap();

        let (address, entry) = wait_for_entry(&registry)
            .await
            .expect("no announcement registered");
        assert_eq!(address, "127.0.0.1");
        assert_eq!(entry.source, EntrySource::Announcement);
        assert_eq!(entry.item.identity(), handle.identity());
        listener.abort();
    }

    #[tokio::test]
    #[ignore = "needs an interface with multicast routing"]
    async fn test_announce_reaches_listener() {
        let port = free_udp_port();
        let channel = channel_on(port);
        let registry = DiscoveryRegistry::new();
        let listener = channel.listen(registry.clone()).await.unwrap();

        let (server, _task) = ItemServer::start(Addressing::loopback().shared())
            .await
            .unwrap();
        let handle = server.export_reflect(DiscoveryRegistry::new());
        channel.announce(&handle, 1).await.unwrap();

        let (_, entry) = wait_for_entry(&registry).await.expect("announcement not heard");
        assert_eq!(entry.source, EntrySource::Announcement);
        assert_eq!(entry.item.identity(), handle.identity());
        listener.abort();
    }
}
