//! ItemServer: TCP server for exported items.
//!
//! An [`ItemServer`] binds through the [`ListenerFactory`], keeps the export
//! table (id → [`Handle`]) and the name table (name → handle), and serves
//! one request at a time per connection, many connections in parallel.

use crate::dispatch::{Dispatcher, Reflect, Target};
use crate::message::*;
use crate::transport::{read_message, write_message, ListenerFactory, WireError};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use farcall_types::{
    ClientRoute, Endpoint, Identity, Invoke, InvokeError, InvokeResult, ItemId, RemoteRef,
    SharedAddressing, Value,
};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

tokio::task_local! {
    static CALLER: SocketAddr;
}

/// Socket address of the remote caller whose request is being dispatched.
///
/// `None` for in-process calls.
pub fn caller_addr() -> Option<SocketAddr> {
    CALLER.try_with(|addr| *addr).ok()
}

/// An exported item: a dispatcher plus the addressing captured at export.
///
/// A handle's identity is its export id (`Identity::Exported`), not the
/// target's address. Each target is exported at most once per server, so
/// the id stands for the target network-wide: a handle, every proxy decoded
/// from its reference and every capsule of it compare equal and hash alike.
/// The local target itself (or a `Dispatcher` around it) keeps its
/// `Identity::Local` and does not compare equal to the handle; use
/// [`Handle::dispatcher`] to reach the target's own identity.
#[derive(Clone)]
pub struct Handle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: ItemId,
    dispatcher: Dispatcher,
    endpoint: Endpoint,
    route: ClientRoute,
}

impl Handle {
    fn new(id: ItemId, dispatcher: Dispatcher, endpoint: Endpoint, route: ClientRoute) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                dispatcher,
                endpoint,
                route,
            }),
        }
    }

    pub fn id(&self) -> ItemId {
        self.inner.id
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Portable reference; the label is the target's current string form.
    pub fn reference(&self) -> RemoteRef {
        RemoteRef {
            id: self.inner.id,
            endpoint: self.inner.endpoint.clone(),
            route: self.inner.route.clone(),
            label: self.inner.dispatcher.to_string(),
        }
    }
}

#[async_trait]
impl Invoke for Handle {
    async fn invoke(&self, method: Option<&str>, args: Value) -> InvokeResult<Value> {
        self.inner.dispatcher.invoke(method, args).await
    }

    fn identity(&self) -> Identity {
        Identity::Exported(self.inner.id)
    }

    fn remote_ref(&self) -> Option<RemoteRef> {
        Some(self.reference())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.dispatcher.fmt(f)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.endpoint)
            .field("route", &self.inner.route)
            .finish()
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

/// The local item server: listener, export table and name table.
pub struct ItemServer {
    addressing: SharedAddressing,
    /// Actual bound address (useful when binding to port 0).
    local_addr: SocketAddr,
    start_time: Instant,
    exports: DashMap<ItemId, Handle>,
    /// One export per target identity.
    by_identity: DashMap<Identity, ItemId>,
    names: DashMap<String, Handle>,
}

impl ItemServer {
    /// Bind the listener described by `addressing` and start accepting.
    pub async fn start(
        addressing: SharedAddressing,
    ) -> Result<(Arc<Self>, tokio::task::JoinHandle<()>), WireError> {
        let listener = ListenerFactory::new(addressing.clone()).bind().await?;
        let local_addr = listener.local_addr()?;

        let server = Arc::new(Self {
            addressing,
            local_addr,
            start_time: Instant::now(),
            exports: DashMap::new(),
            by_identity: DashMap::new(),
            names: DashMap::new(),
        });
        info!(
            addr = %local_addr,
            advertised = %server.endpoint(),
            "Item server listening"
        );

        let server_clone = Arc::clone(&server);
        let accept_handle = tokio::spawn(async move {
            Self::accept_loop(listener, server_clone).await;
        });

        Ok((server, accept_handle))
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The server's nominal `server_host:server_port`.
    pub fn endpoint(&self) -> Endpoint {
        let addressing = self.addressing.read().unwrap_or_else(|e| e.into_inner());
        Endpoint::new(addressing.server_host.clone(), addressing.server_port)
    }

    fn route(&self) -> ClientRoute {
        let addressing = self.addressing.read().unwrap_or_else(|e| e.into_inner());
        ClientRoute {
            host: addressing.client_host.clone(),
            port: addressing.client_port,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Export a target, or return the handle it is already exported as.
    pub fn export(&self, target: Target) -> Handle {
        let dispatcher = Dispatcher::new(target);
        let identity = dispatcher.identity();
        if let Identity::Exported(id) = identity {
            if let Some(handle) = self.exports.get(&id) {
                return handle.clone();
            }
        }

        let id = *self.by_identity.entry(identity).or_insert_with(|| {
            let id = ItemId::new_v4();
            let handle = Handle::new(id, dispatcher.clone(), self.endpoint(), self.route());
            debug!(item = %id, target = %dispatcher, "Exported item");
            self.exports.insert(id, handle);
            id
        });
        // Entries are never removed from `exports`, so the id is present.
        match self.exports.get(&id) {
            Some(handle) => handle.clone(),
            None => Handle::new(id, dispatcher, self.endpoint(), self.route()),
        }
    }

    /// Export a reflective target.
    pub fn export_reflect<T: Reflect>(&self, target: T) -> Handle {
        self.export(Target::reflect(target))
    }

    /// Look up an exported item by id.
    pub fn get(&self, id: &ItemId) -> Option<Handle> {
        self.exports.get(id).map(|h| h.clone())
    }

    pub fn export_count(&self) -> usize {
        self.exports.len()
    }

    /// Bind `name` to `handle`; fails if the name is taken.
    pub fn bind(&self, name: &str, handle: &Handle) -> InvokeResult<()> {
        match self.names.entry(name.to_string()) {
            Entry::Occupied(_) => Err(InvokeError::InvalidArgument(format!(
                "name '{name}' is already bound"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
                info!(name = %name, item = %handle.id(), "Bound item");
                Ok(())
            }
        }
    }

    /// Bind `name` to `handle`, replacing any previous binding.
    pub fn rebind(&self, name: &str, handle: &Handle) -> Option<Handle> {
        info!(name = %name, item = %handle.id(), "Rebound item");
        self.names.insert(name.to_string(), handle.clone())
    }

    pub fn unbind(&self, name: &str) -> Option<Handle> {
        self.names.remove(name).map(|(_, handle)| handle)
    }

    pub fn lookup(&self, name: &str) -> Option<Handle> {
        self.names.get(name).map(|h| h.clone())
    }

    /// Bound names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Convert an outgoing value, exporting any local items it carries.
    ///
    /// Items that already have a reference (handles, proxies) pass through.
    pub fn to_wire(&self, value: &Value) -> InvokeResult<WireValue> {
        WireValue::from_value(value, &|item: &Arc<dyn Invoke>| {
            Ok(match item.remote_ref() {
                Some(reference) => reference,
                None => self.export(Target::native(Arc::clone(item))).reference(),
            })
        })
    }

    /// Internal accept loop; runs in a spawned task.
    async fn accept_loop(listener: TcpListener, server: Arc<ItemServer>) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(addr = %addr, "Accepted connection");
                    let server = Arc::clone(&server);
                    tokio::spawn(async move {
                        if let Err(e) = server.connection_loop(stream, addr).await {
                            debug!(addr = %addr, error = %e, "Connection ended");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Read/write message loop for an established connection.
    async fn connection_loop(&self, stream: TcpStream, caller: SocketAddr) -> Result<(), WireError> {
        let (mut reader, mut writer) = stream.into_split();
        loop {
            let msg = match read_message(&mut reader).await {
                Ok(m) => m,
                Err(WireError::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };

            match msg.kind {
                WireMessageKind::Request(request) => {
                    let response = self.handle_request(request, caller).await;
                    let reply = WireMessage {
                        id: msg.id,
                        kind: WireMessageKind::Response(response),
                    };
                    write_message(&mut writer, &reply).await?;
                }
                WireMessageKind::Response(_) => {
                    warn!(addr = %caller, id = %msg.id, "Unexpected response message");
                }
            }
        }
    }

    async fn handle_request(&self, request: WireRequest, caller: SocketAddr) -> WireResponse {
        match request {
            WireRequest::Ping => WireResponse::Pong {
                uptime_secs: self.uptime_secs(),
            },
            WireRequest::List => WireResponse::Names {
                names: self.names(),
            },
            WireRequest::Lookup { name } => match self.lookup(&name) {
                Some(handle) => WireResponse::Reference {
                    reference: handle.reference(),
                },
                None => WireResponse::error(&InvokeError::NotFound(format!(
                    "no item bound to '{name}'"
                ))),
            },
            WireRequest::Invoke { item, name, args } => {
                match self.invoke_exported(item, name, args, caller).await {
                    Ok(value) => WireResponse::Value { value },
                    Err(e) => {
                        debug!(item = %item, addr = %caller, error = %e, "Invocation failed");
                        WireResponse::error(&e)
                    }
                }
            }
        }
    }

    async fn invoke_exported(
        &self,
        item: ItemId,
        method: Option<String>,
        args: WireValue,
        caller: SocketAddr,
    ) -> InvokeResult<WireValue> {
        let handle = self
            .get(&item)
            .ok_or_else(|| InvokeError::NotFound(format!("no exported item {item}")))?;
        let args = args.into_value();
        let result = CALLER
            .scope(caller, handle.invoke(method.as_deref(), args))
            .await?;
        self.to_wire(&result)
    }
}
