//! Eviction loop: announces the registry and prunes dead entries.
//!
//! One loop per registry: announce the registry's own reference, sleep for
//! the sweep interval, then probe every entry once. Repeats until the
//! shutdown signal fires.

use crate::multicast::Multicast;
use crate::registry::DiscoveryRegistry;

use farcall_types::config::RegistryConfig;
use farcall_types::{Invoke, InvokeError, InvokeResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Timing of the eviction loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    /// Sleep between sweeps.
    pub interval: Duration,
    /// Pause between probing successive entries.
    pub pause: Duration,
    /// Hop limit of each announcement.
    pub announce_ttl: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::from(&RegistryConfig::default())
    }
}

impl From<&RegistryConfig> for SweepConfig {
    fn from(config: &RegistryConfig) -> Self {
        Self {
            interval: config.sweep_interval(),
            pause: config.probe_pause(),
            announce_ttl: config.announce_ttl,
        }
    }
}

/// Start the eviction loop for `registry`.
///
/// `announced` is the reference broadcast on `channel` before each sweep.
/// Fails if a loop is already running for this registry.
pub fn spawn_eviction_loop(
    registry: DiscoveryRegistry,
    channel: Arc<dyn Multicast>,
    announced: Arc<dyn Invoke>,
    config: SweepConfig,
    mut shutdown: watch::Receiver<bool>,
) -> InvokeResult<JoinHandle<()>> {
    if !registry.claim_eviction() {
        return Err(InvokeError::InvalidArgument(
            "an eviction loop is already running for this registry".to_string(),
        ));
    }

    info!(
        interval_secs = config.interval.as_secs(),
        pause_secs = config.pause.as_secs(),
        ttl = config.announce_ttl,
        "Starting eviction loop"
    );

    Ok(tokio::spawn(async move {
        loop {
            if let Err(e) = channel.announce(&*announced, config.announce_ttl).await {
                warn!(error = %e, "Registry announcement failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(config.interval) => {}
                _ = shutdown.changed() => {
                    info!("Eviction loop: shutdown signal received");
                    break;
                }
            }

            tokio::select! {
                report = registry.sweep(config.pause) => {
                    debug!(
                        probed = report.probed,
                        evicted = report.evicted,
                        remaining = registry.len(),
                        "Eviction sweep done"
                    );
                }
                _ = shutdown.changed() => {
                    info!("Eviction loop: shutdown signal received");
                    break;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use farcall_types::Value;
    use std::fmt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Channel that counts announcements and never listens.
    #[derive(Default)]
    struct CountingChannel {
        announced: AtomicUsize,
    }

    #[async_trait]
    impl Multicast for CountingChannel {
        async fn announce(&self, _item: &dyn Invoke, _ttl: u32) -> InvokeResult<()> {
            self.announced.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn listen(&self, _registry: DiscoveryRegistry) -> InvokeResult<JoinHandle<()>> {
            Ok(tokio::spawn(async {}))
        }
    }

    struct Probe(bool);

    impl fmt::Display for Probe {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(if self.0 { "alive" } else { "dead" })
        }
    }

    #[async_trait]
    impl Invoke for Probe {
        async fn invoke(&self, _method: Option<&str>, _args: Value) -> InvokeResult<Value> {
            if self.0 {
                Ok(Value::from("alive"))
            } else {
                Err(InvokeError::Connectivity("unreachable".into()))
            }
        }
    }

    fn fast() -> SweepConfig {
        SweepConfig {
            interval: Duration::from_millis(20),
            pause: Duration::from_millis(1),
            announce_ttl: 1,
        }
    }

    #[test]
    fn test_default_timing() {
        let config = SweepConfig::default();
        assert_eq!(config.interval, Duration::from_secs(3600));
        assert_eq!(config.pause, Duration::from_secs(300));
        assert_eq!(config.announce_ttl, 200);
    }

    #[tokio::test]
    async fn test_loop_announces_and_evicts() {
        let registry = DiscoveryRegistry::new();
        registry.register("a", Arc::new(Probe(true)));
        registry.register("b", Arc::new(Probe(false)));
        registry.register("c", Arc::new(Probe(true)));

        let channel = Arc::new(CountingChannel::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = spawn_eviction_loop(
            registry.clone(),
            channel.clone(),
            Arc::new(Probe(true)),
            fast(),
            shutdown_rx,
        )
        .unwrap();

        for _ in 0..100 {
            if registry.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let keys: Vec<String> = registry.snapshot().into_keys().collect();
        assert_eq!(keys, vec!["a".to_string(), "c".to_string()]);
        assert!(channel.announced.load(Ordering::SeqCst) >= 1);

        let _ = shutdown_tx.send(true);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_one_loop_per_registry() {
        let registry = DiscoveryRegistry::new();
        let channel: Arc<dyn Multicast> = Arc::new(CountingChannel::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let first = spawn_eviction_loop(
            registry.clone(),
            Arc::clone(&channel),
            Arc::new(Probe(true)),
            fast(),
            shutdown_rx.clone(),
        );
        assert!(first.is_ok());
        let second = spawn_eviction_loop(
            registry,
            channel,
            Arc::new(Probe(true)),
            fast(),
            shutdown_rx,
        );
        assert!(second.is_err());
    }
}
