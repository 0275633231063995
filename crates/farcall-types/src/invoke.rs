//! The single-operation capability contract.
//!
//! Any object may be invoked through [`Invoke`]: a method name plus a dynamic
//! argument value in, a dynamic value or an [`InvokeError`] out. Local
//! dispatchers, exported handles and remote proxies all implement it, which
//! is what lets a caller treat a local item and a remote one the same way.

use crate::error::InvokeResult;
use crate::reference::RemoteRef;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identifier assigned to an item when it is exported.
pub type ItemId = uuid::Uuid;

/// Identity of an invokable object.
///
/// Equality and hashing of every wrapper in this workspace are defined
/// through this value. Local wrappers (dispatchers, monitors) report their
/// target's identity; exported handles and the proxies decoded from them
/// report the export id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identity {
    /// An in-process object, identified by its address.
    Local(usize),
    /// An exported item, identified network-wide by its export id.
    Exported(ItemId),
}

impl Identity {
    /// Address identity of any object.
    pub fn of<T: ?Sized>(obj: &T) -> Self {
        Identity::Local(obj as *const T as *const () as usize)
    }

    /// Stable 64-bit hash of this identity.
    pub fn hash_code(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Local(addr) => write!(f, "local@{addr:#x}"),
            Identity::Exported(id) => write!(f, "item:{id}"),
        }
    }
}

/// Something that can be called by method name with dynamic arguments.
///
/// `Display` supplies the item's string form, which is also what the
/// discovery registry uses as its liveness probe.
#[async_trait]
pub trait Invoke: fmt::Display + Send + Sync + 'static {
    /// Call `method` with `args`.
    ///
    /// `args` is `Value::Null` for no arguments, a `Value::List` for several
    /// positional arguments, and any other value for a single argument.
    async fn invoke(&self, method: Option<&str>, args: Value) -> InvokeResult<Value>;

    /// Identity used for equality and hashing of wrappers around this object.
    fn identity(&self) -> Identity {
        Identity::of(self)
    }

    /// Portable reference, if this object is reachable over the network.
    fn remote_ref(&self) -> Option<RemoteRef> {
        None
    }
}

impl fmt::Debug for dyn Invoke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoke")
            .field("item", &self.to_string())
            .field("identity", &self.identity())
            .finish()
    }
}
