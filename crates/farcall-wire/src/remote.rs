//! Caller-side proxy for an exported item.
//!
//! A [`RemoteItem`] carries the reference it was built from and dials through
//! the reference's [`ClientRoute`] on every call, one request per connection.

use crate::message::*;
use crate::transport::{read_message, write_message, Connector, WireError};

use async_trait::async_trait;
use farcall_types::{
    ClientRoute, Endpoint, Identity, Invoke, InvokeError, InvokeResult, RemoteRef, Value,
};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Proxy for an item exported by another process (or this one).
pub struct RemoteItem {
    reference: RemoteRef,
    connector: Connector,
}

impl RemoteItem {
    pub fn new(reference: RemoteRef) -> Self {
        let connector = Connector::new(reference.route.clone());
        Self {
            reference,
            connector,
        }
    }

    pub fn reference(&self) -> &RemoteRef {
        &self.reference
    }
}

#[async_trait]
impl Invoke for RemoteItem {
    async fn invoke(&self, method: Option<&str>, args: Value) -> InvokeResult<Value> {
        let request = WireRequest::Invoke {
            item: self.reference.id,
            name: method.map(str::to_string),
            args: WireValue::from_value_exported(&args)?,
        };
        match request_via(&self.connector, &self.reference.endpoint, request).await? {
            WireResponse::Value { value } => Ok(value.into_value()),
            WireResponse::Error { class, message } => Err(InvokeError::from_parts(class, message)),
            other => Err(unexpected(&other)),
        }
    }

    fn identity(&self) -> Identity {
        Identity::Exported(self.reference.id)
    }

    fn remote_ref(&self) -> Option<RemoteRef> {
        Some(self.reference.clone())
    }
}

impl fmt::Display for RemoteItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference.label)
    }
}

impl fmt::Debug for RemoteItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteItem")
            .field("reference", &self.reference)
            .finish()
    }
}

/// Send one request over a fresh connection and wait for its response.
pub async fn request_via(
    connector: &Connector,
    nominal: &Endpoint,
    request: WireRequest,
) -> Result<WireResponse, WireError> {
    let mut stream = connector.connect(nominal).await?;
    let msg = WireMessage {
        id: uuid::Uuid::new_v4().to_string(),
        kind: WireMessageKind::Request(request),
    };
    write_message(&mut stream, &msg).await?;
    let reply = read_message(&mut stream).await?;
    if reply.id != msg.id {
        return Err(WireError::Unexpected(format!(
            "response id {} does not match request {}",
            reply.id, msg.id
        )));
    }
    match reply.kind {
        WireMessageKind::Response(response) => Ok(response),
        WireMessageKind::Request(_) => Err(WireError::Unexpected(
            "request received where a response was expected".to_string(),
        )),
    }
}

fn direct(endpoint: &Endpoint) -> Connector {
    Connector::new(ClientRoute {
        host: endpoint.host.clone(),
        port: endpoint.port,
    })
}

fn unexpected(response: &WireResponse) -> InvokeError {
    WireError::Unexpected(format!("{response:?}")).into()
}

/// Look up `name` in the name table of the server at `endpoint`.
pub async fn lookup(endpoint: &Endpoint, name: &str) -> InvokeResult<Arc<dyn Invoke>> {
    debug!(endpoint = %endpoint, name = %name, "Looking up item");
    let request = WireRequest::Lookup {
        name: name.to_string(),
    };
    match request_via(&direct(endpoint), endpoint, request).await? {
        WireResponse::Reference { reference } => Ok(Arc::new(RemoteItem::new(reference))),
        WireResponse::Error { class, message } => Err(InvokeError::from_parts(class, message)),
        other => Err(unexpected(&other)),
    }
}

/// Names bound on the server at `endpoint`.
pub async fn list_names(endpoint: &Endpoint) -> InvokeResult<Vec<String>> {
    match request_via(&direct(endpoint), endpoint, WireRequest::List).await? {
        WireResponse::Names { names } => Ok(names),
        WireResponse::Error { class, message } => Err(InvokeError::from_parts(class, message)),
        other => Err(unexpected(&other)),
    }
}

/// Ping the server at `endpoint`, returning its uptime in seconds.
pub async fn ping(endpoint: &Endpoint) -> InvokeResult<u64> {
    match request_via(&direct(endpoint), endpoint, WireRequest::Ping).await? {
        WireResponse::Pong { uptime_secs } => Ok(uptime_secs),
        WireResponse::Error { class, message } => Err(InvokeError::from_parts(class, message)),
        other => Err(unexpected(&other)),
    }
}
