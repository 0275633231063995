//! Discovery registry: the network-wide set of known items.
//!
//! Entries are keyed by origin address. Direct registration and multicast
//! announcements share one key space and overwrite on collision; the only
//! other way out is failing a liveness probe during a [`sweep`].
//!
//! [`sweep`]: DiscoveryRegistry::sweep

use crate::dispatch::{ArgsExt, MethodTable, Reflect};
use crate::server::caller_addr;

use chrono::{DateTime, Utc};
use farcall_types::{Invoke, Value, ValueType};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info};

/// Key used for `post` calls made in-process.
pub const LOCAL_CALLER: &str = "localhost";

/// How an entry got into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    /// `register` or a `post` call.
    Direct,
    /// A multicast announcement.
    Announcement,
}

/// A registered item.
#[derive(Clone)]
pub struct RegistryEntry {
    pub item: Arc<dyn Invoke>,
    pub source: EntrySource,
    pub registered_at: DateTime<Utc>,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("item", &self.item.to_string())
            .field("source", &self.source)
            .field("registered_at", &self.registered_at)
            .finish()
    }
}

/// Outcome of one liveness sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub probed: usize,
    pub evicted: usize,
}

/// Thread-safe registry of known items, keyed by origin address.
#[derive(Clone, Default)]
pub struct DiscoveryRegistry {
    entries: Arc<RwLock<HashMap<String, RegistryEntry>>>,
    eviction_claimed: Arc<AtomicBool>,
}

impl DiscoveryRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn upsert(&self, address: String, item: Arc<dyn Invoke>, source: EntrySource) {
        debug!(address = %address, item = %item, source = ?source, "Registering item");
        let entry = RegistryEntry {
            item,
            source,
            registered_at: Utc::now(),
        };
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(address, entry);
    }

    /// Register `item` under `address`, replacing any previous entry.
    pub fn register(&self, address: impl Into<String>, item: Arc<dyn Invoke>) {
        self.upsert(address.into(), item, EntrySource::Direct);
    }

    /// Register an item heard on the rendezvous channel.
    pub fn register_from_announcement(&self, address: impl Into<String>, item: Arc<dyn Invoke>) {
        self.upsert(address.into(), item, EntrySource::Announcement);
    }

    pub fn remove(&self, address: &str) -> Option<RegistryEntry> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(address)
    }

    pub fn get(&self, address: &str) -> Option<RegistryEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(address).cloned()
    }

    /// Point-in-time copy of the registered items.
    pub fn snapshot(&self) -> BTreeMap<String, Arc<dyn Invoke>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .map(|(address, entry)| (address.clone(), Arc::clone(&entry.item)))
            .collect()
    }

    /// Point-in-time copy of the entries, sorted by address.
    pub fn entries(&self) -> Vec<(String, RegistryEntry)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<_> = entries
            .iter()
            .map(|(address, entry)| (address.clone(), entry.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Probe every entry once, in address order, removing those that fail.
    ///
    /// Probes run one at a time with `pause` between successive probes. An
    /// entry that was overwritten while its probe ran is kept.
    pub async fn sweep(&self, pause: Duration) -> SweepReport {
        let mut report = SweepReport::default();
        for (i, (address, entry)) in self.entries().into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(pause).await;
            }
            report.probed += 1;
            if let Err(e) = entry.item.invoke(Some("toString"), Value::Null).await {
                if self.remove_if_same(&address, &entry) {
                    report.evicted += 1;
                    info!(address = %address, error = %e, "Evicted unresponsive item");
                }
            }
        }
        debug!(probed = report.probed, evicted = report.evicted, "Sweep finished");
        report
    }

    fn remove_if_same(&self, address: &str, probed: &RegistryEntry) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let same = entries
            .get(address)
            .is_some_and(|current| current.item.identity() == probed.item.identity());
        if same {
            entries.remove(address);
        }
        same
    }

    /// Claim the right to run this registry's eviction loop; `false` if
    /// another loop already holds it.
    pub(crate) fn claim_eviction(&self) -> bool {
        self.eviction_claimed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

impl fmt::Display for DiscoveryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(
            "Welcome to the farcall item registry!\n\n\
             There are two ways to register a remote item reference:\n\n\
             \tFirst, multicast announcements are registered automatically.\n\n\
             \tSecond, calling the 'post' method with a remote reference\n\
             \tregisters it under the caller's address.\n\n\
             All currently registered references can be requested with the\n\
             'get' method. It takes no arguments and returns a map of the\n\
             registered references, keyed by their origin addresses.\n\
             Unresponsive references are purged periodically.\n\n\
             Enjoy!",
        )
    }
}

impl Reflect for DiscoveryRegistry {
    fn methods() -> MethodTable<Self> {
        MethodTable::<Self>::new()
            .method("post", &[ValueType::Invoke], |registry, args| {
                let address = caller_addr()
                    .map(|addr| addr.ip().to_string())
                    .unwrap_or_else(|| LOCAL_CALLER.to_string());
                registry.register(address, args.item_at(0)?);
                Ok(Value::Null)
            })
            .method("get", &[], |registry, _| {
                let map = registry
                    .snapshot()
                    .into_iter()
                    .map(|(address, item)| (address, Value::Item(item)))
                    .collect();
                Ok(Value::Map(map))
            })
    }
}
