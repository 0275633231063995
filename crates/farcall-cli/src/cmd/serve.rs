//! `farcall serve`: resolve an item and bind it as `main`.

use super::{fail, resolver, runtime};
use crate::cli::ServeArgs;
use crate::ui;
use farcall_types::config::{AddressingConfig, NodeConfig, DEFAULT_ITEM_NAME};
use farcall_types::{Addressing, InvokeError, Value};
use farcall_wire::{ItemServer, Monitor, Target};
use std::sync::Arc;
use tracing::info;

/// Command-line flags override the `[addressing]` section.
pub fn addressing(config: &NodeConfig, args: &ServeArgs) -> Addressing {
    let file = &config.addressing;
    AddressingConfig {
        server_host: args.local_host.clone().or_else(|| file.server_host.clone()),
        server_port: args.local_port.unwrap_or(file.server_port),
        client_host: args.client_host.clone().or_else(|| file.client_host.clone()),
        client_port: args.client_port.unwrap_or(file.client_port),
    }
    .reconcile()
}

pub fn cmd_serve(config: NodeConfig, args: ServeArgs) {
    let addressing = addressing(&config, &args);
    let rt = runtime();
    rt.block_on(async {
        let resolver = resolver(&config);
        let item = match resolver.resolve(args.locator.as_deref()).await {
            Ok(item) => item,
            Err(e) => fail("Failed to resolve item", &e),
        };

        let (server, _accept) = match ItemServer::start(addressing.shared()).await {
            Ok(started) => started,
            Err(e) => fail("Failed to start item server", &InvokeError::from(e)),
        };

        if let Some(locator) = args.proxy_of.as_deref() {
            let other = match resolver.resolve(Some(locator)).await {
                Ok(other) => other,
                Err(e) => fail("Failed to resolve proxied item", &e),
            };
            // The first item may be remote, so hand it an exported handle.
            let other = server.export(Target::native(other));
            if let Err(e) = item.invoke(Some("setItem"), Value::Item(Arc::new(other))).await {
                fail("Failed to hand the proxied item over", &e);
            }
        }

        let target = if args.monitor {
            Target::native(Arc::new(Monitor::new(Target::native(item))))
        } else {
            Target::native(item)
        };
        let handle = server.export(target);
        if let Err(e) = server.bind(DEFAULT_ITEM_NAME, &handle) {
            fail("Failed to bind item", &e);
        }

        let reference = handle.reference();
        info!(item = %handle.id(), "Serving item");
        ui::section("farcall item server");
        ui::kv("Item", &reference.label);
        ui::kv("Listening", &server.local_addr().to_string());
        ui::kv("Callers dial", &reference.dial_target().to_string());
        ui::kv("Locator", &format!("//{}/{DEFAULT_ITEM_NAME}", reference.dial_target()));
        ui::blank();
        ui::hint("Press Ctrl-C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to wait for Ctrl-C");
        }
        info!("Shutting down");
    });
}
