//! `farcall registry`: a discovery registry node.

use super::{fail, runtime};
use crate::cli::RegistryArgs;
use crate::ui;
use farcall_types::config::NodeConfig;
use farcall_types::{Addressing, Invoke, InvokeError};
use farcall_wire::{
    spawn_eviction_loop, DiscoveryRegistry, ItemServer, Multicast, SweepConfig, Target,
    UdpMulticast,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub fn cmd_registry(config: NodeConfig, args: RegistryArgs) {
    let client_host = args
        .client_host
        .or_else(|| config.addressing.client_host.clone());
    let addressing = Addressing::reconcile(
        config.addressing.server_host.clone(),
        config.registry.port,
        client_host,
        0,
    );

    let rt = runtime();
    rt.block_on(async {
        let (server, _accept) = match ItemServer::start(addressing.shared()).await {
            Ok(started) => started,
            Err(e) => fail("Failed to start registry server", &InvokeError::from(e)),
        };

        let registry = DiscoveryRegistry::new();
        let handle = server.export(Target::reflect(registry.clone()));
        if let Err(e) = server.bind(&config.registry.name, &handle) {
            fail("Failed to bind registry", &e);
        }

        let channel: Arc<dyn Multicast> = Arc::new(UdpMulticast::new(&config.multicast));
        if let Err(e) = channel.listen(registry.clone()).await {
            fail("Failed to join the announcement group", &e);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let announced: Arc<dyn Invoke> = Arc::new(handle.clone());
        let eviction = match spawn_eviction_loop(
            registry.clone(),
            channel,
            announced,
            SweepConfig::from(&config.registry),
            shutdown_rx,
        ) {
            Ok(task) => task,
            Err(e) => fail("Failed to start eviction loop", &e),
        };

        let reference = handle.reference();
        ui::section("farcall discovery registry");
        ui::kv("Listening", &server.local_addr().to_string());
        ui::kv(
            "Locator",
            &format!("//{}/{}", reference.dial_target(), config.registry.name),
        );
        ui::kv(
            "Group",
            &format!("{}:{}", config.multicast.group, config.multicast.port),
        );
        ui::kv(
            "Sweep",
            &format!(
                "every {}s, {}s probe pause",
                config.registry.sweep_interval_secs, config.registry.probe_pause_secs
            ),
        );
        ui::blank();
        ui::hint("Press Ctrl-C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to wait for Ctrl-C");
        }
        info!(entries = registry.len(), "Shutting down registry");
        let _ = shutdown_tx.send(true);
        let _ = eviction.await;
        ui::success("Registry stopped");
    });
}
