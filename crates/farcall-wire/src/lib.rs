//! farcall wire layer: remote item invocation without generated interfaces.
//!
//! Any object can be exported from one process and called from another by
//! method name, over TCP connections using a length-framed JSON protocol.
//!
//! ## Architecture
//!
//! - **Dispatcher**: normalises native [`Invoke`](farcall_types::Invoke)
//!   targets and reflective targets (exact-signature method tables) to one
//!   call contract
//! - **ListenerFactory / Connector**: where a server binds, and where a caller
//!   is redirected to dial
//! - **ItemServer**: accepts connections, exports items as [`Handle`]s and
//!   keeps the name table remote locators look up
//! - **RemoteItem**: caller-side proxy for an exported item
//! - **capsule**: gzip-compressed portable form of a reference
//! - **Resolver**: turns locator strings into callable items
//! - **DiscoveryRegistry**: network-wide set of known items, fed by
//!   registration and multicast announcement, pruned by liveness sweeps

pub mod capsule;
pub mod discovery;
pub mod dispatch;
pub mod message;
pub mod monitor;
pub mod multicast;
pub mod registry;
pub mod remote;
pub mod resolver;
pub mod server;
pub mod transport;

pub use capsule::CapsuleError;
pub use discovery::{spawn_eviction_loop, SweepConfig};
pub use dispatch::{ArgsExt, Dispatcher, MethodTable, Reflect, Target};
pub use message::{WireMessage, WireRequest, WireResponse, WireValue};
pub use monitor::Monitor;
pub use multicast::{Multicast, UdpMulticast};
pub use registry::{DiscoveryRegistry, EntrySource, RegistryEntry, SweepReport};
pub use remote::RemoteItem;
pub use resolver::{Locator, Resolver, TypeRegistry};
pub use server::{caller_addr, Handle, ItemServer};
pub use transport::{Connector, ListenerFactory, WireError};
