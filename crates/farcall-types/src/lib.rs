//! Core types and traits for farcall.
//!
//! This crate defines the shared data structures used by the wire layer and
//! the bootstrap binary: the dynamic [`value::Value`] model, the
//! [`invoke::Invoke`] capability contract, the error taxonomy, addressing
//! configuration and portable remote references. It contains no networking.

pub mod addressing;
pub mod config;
pub mod error;
pub mod invoke;
pub mod reference;
pub mod value;

pub use addressing::{Addressing, SharedAddressing};
pub use error::{ErrorClass, InvokeError, InvokeResult};
pub use invoke::{Identity, Invoke, ItemId};
pub use reference::{ClientRoute, Endpoint, RemoteRef};
pub use value::{Value, ValueType};
