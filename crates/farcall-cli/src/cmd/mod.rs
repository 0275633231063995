//! Subcommand implementations.

pub mod call;
pub mod registry;
pub mod serve;

use crate::ui;
use farcall_types::config::NodeConfig;
use farcall_types::{ErrorClass, InvokeError};
use farcall_wire::{DiscoveryRegistry, Resolver, TypeRegistry};

/// Type name `farcall serve` accepts for a fresh discovery registry.
pub const REGISTRY_TYPE: &str = "farcall.Registry";

/// Types that `some.TypeName` locators can instantiate in this binary.
pub fn builtin_types() -> TypeRegistry {
    let mut types = TypeRegistry::new();
    types.register_reflective::<DiscoveryRegistry>(REGISTRY_TYPE);
    types
}

pub fn resolver(config: &NodeConfig) -> Resolver {
    Resolver::new(builtin_types())
        .with_resource_roots(config.resource_roots.clone())
        .with_registry_port(config.registry.port)
}

pub fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            ui::error(&format!("Failed to start async runtime: {e}"));
            std::process::exit(1);
        }
    }
}

/// Report a bootstrap failure and exit.
pub fn fail(context: &str, e: &InvokeError) -> ! {
    tracing::error!(error = %e, "{context}");
    let fix = match e.class() {
        ErrorClass::Connectivity => "Check that the server is running and reachable at that address",
        ErrorClass::NotFound => "Check the name or path in the locator (`farcall names //host:port`)",
        ErrorClass::Resolution | ErrorClass::NoSuchMethod => {
            "Check the locator type and the method signature"
        }
        ErrorClass::Format => "The capsule or response is corrupt; re-create it with `farcall freeze`",
        ErrorClass::InvalidArgument | ErrorClass::Application => "Check the arguments",
    };
    ui::error_with_fix(&format!("{context}: {e}"), fix);
    std::process::exit(1);
}
