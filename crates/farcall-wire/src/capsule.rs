//! Reference capsules: the portable, compressed form of an exported item.
//!
//! A capsule is a gzip stream holding one JSON envelope:
//!
//! ```json
//! {"kind": "farcall.remote-item", "version": 1, "reference": { ... }}
//! ```
//!
//! The reference embeds the client route, so a process that decodes the
//! capsule anywhere dials back through the operator-configured address.

use crate::remote::RemoteItem;
use farcall_types::{Invoke, InvokeError, RemoteRef};
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read, Write};
use thiserror::Error;

/// Envelope kind written into every capsule.
pub const CAPSULE_KIND: &str = "farcall.remote-item";
/// Envelope version this build reads and writes.
pub const CAPSULE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CapsuleError {
    #[error("Malformed capsule: {0}")]
    Format(String),
    #[error("Unresolvable capsule: {0}")]
    Resolution(String),
    #[error("Item '{0}' is not exported and cannot be encoded")]
    NotExported(String),
    #[error("Capsule IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CapsuleError> for InvokeError {
    fn from(e: CapsuleError) -> Self {
        match e {
            CapsuleError::Format(_) => InvokeError::Format(e.to_string()),
            CapsuleError::Resolution(_) => InvokeError::Resolution(e.to_string()),
            CapsuleError::NotExported(_) => InvokeError::InvalidArgument(e.to_string()),
            CapsuleError::Io(_) => InvokeError::Connectivity(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    kind: &'a str,
    version: u32,
    reference: &'a RemoteRef,
}

/// Envelope as read back; the reference is only parsed once kind and version check out.
#[derive(Deserialize)]
struct RawEnvelope {
    kind: String,
    version: u32,
    reference: serde_json::Value,
}

/// Write the capsule of `item` to `writer`.
///
/// The compressor is finished before returning; on error it is dropped.
pub fn encode<W: Write>(item: &dyn Invoke, writer: W) -> Result<(), CapsuleError> {
    let reference = item
        .remote_ref()
        .ok_or_else(|| CapsuleError::NotExported(item.to_string()))?;
    let envelope = Envelope {
        kind: CAPSULE_KIND,
        version: CAPSULE_VERSION,
        reference: &reference,
    };

    let mut encoder = GzEncoder::new(writer, Compression::default());
    serde_json::to_writer(&mut encoder, &envelope).map_err(|e| {
        if e.is_io() {
            CapsuleError::Io(e.into())
        } else {
            CapsuleError::Format(e.to_string())
        }
    })?;
    encoder.finish()?.flush()?;
    Ok(())
}

pub fn to_bytes(item: &dyn Invoke) -> Result<Vec<u8>, CapsuleError> {
    let mut bytes = Vec::new();
    encode(item, &mut bytes)?;
    Ok(bytes)
}

/// Read one capsule from `reader`, yielding a proxy for the referenced item.
///
/// The capsule must be the whole of the input; trailing bytes after the
/// gzip member are a format error.
pub fn decode<R: Read>(reader: R) -> Result<RemoteItem, CapsuleError> {
    let mut input = BufReader::new(reader);
    let mut json = Vec::new();
    GzDecoder::new(&mut input)
        .read_to_end(&mut json)
        .map_err(|e| CapsuleError::Format(format!("bad compressed stream: {e}")))?;
    let trailing = input.fill_buf()?.len();
    if trailing > 0 {
        return Err(CapsuleError::Format(format!(
            "unexpected data after capsule ({trailing}+ bytes)"
        )));
    }

    let envelope: RawEnvelope = serde_json::from_slice(&json)
        .map_err(|e| CapsuleError::Format(format!("bad envelope: {e}")))?;
    if envelope.kind != CAPSULE_KIND {
        return Err(CapsuleError::Resolution(format!(
            "unknown capsule kind '{}'",
            envelope.kind
        )));
    }
    if envelope.version != CAPSULE_VERSION {
        return Err(CapsuleError::Resolution(format!(
            "unsupported capsule version {} (expected {CAPSULE_VERSION})",
            envelope.version
        )));
    }
    let reference: RemoteRef = serde_json::from_value(envelope.reference)
        .map_err(|e| CapsuleError::Format(format!("bad reference: {e}")))?;
    Ok(RemoteItem::new(reference))
}

pub fn from_bytes(bytes: &[u8]) -> Result<RemoteItem, CapsuleError> {
    decode(bytes)
}
