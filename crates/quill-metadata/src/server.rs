//! Response-side metadata carried back from the RPC server

use crate::context::CallContext;
use crate::metadata::MetadataMap;
use crate::policy::{METADATA_HEADER_PREFIX, METADATA_TRAILER_PREFIX};
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Metadata sent by the RPC server for one call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMetadata {
    /// Header-phase metadata
    pub header: MetadataMap,
    /// Trailer-phase metadata
    pub trailer: MetadataMap,
}

impl ServerMetadata {
    pub fn new(header: MetadataMap, trailer: MetadataMap) -> Self {
        Self { header, trailer }
    }

    /// Build from the header and trailer maps received by the RPC transport
    pub fn from_headers(headers: &HeaderMap, trailers: &HeaderMap) -> Self {
        Self {
            header: MetadataMap::from_headers(headers),
            trailer: MetadataMap::from_headers(trailers),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty() && self.trailer.is_empty()
    }

    /// Render into HTTP response headers.
    ///
    /// Header metadata is written as `Grpc-Metadata-<key>` and trailer metadata
    /// as `Grpc-Trailer-<key>`. Entries that are not valid HTTP header names or
    /// values are skipped. Returns the number of values written.
    pub fn write_response_headers(&self, headers: &mut HeaderMap) -> usize {
        write_prefixed(METADATA_HEADER_PREFIX, &self.header, headers)
            + write_prefixed(METADATA_TRAILER_PREFIX, &self.trailer, headers)
    }
}

fn write_prefixed(prefix: &str, md: &MetadataMap, headers: &mut HeaderMap) -> usize {
    let mut written = 0;
    for (key, values) in md.iter() {
        let name = match HeaderName::from_bytes(format!("{}{}", prefix, key).as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                warn!(key, "Skipping server metadata with invalid header name");
                continue;
            }
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.append(name.clone(), value);
                    written += 1;
                }
                Err(_) => warn!(key, "Skipping server metadata with invalid header value"),
            }
        }
    }
    written
}

/// Context key for server metadata
struct ServerMetadataSlot(ServerMetadata);

impl CallContext {
    /// Derive a context carrying `md`
    pub fn with_server_metadata(&self, md: ServerMetadata) -> CallContext {
        self.with_value(ServerMetadataSlot(md))
    }

    /// Server metadata attached to this context, if any
    pub fn server_metadata(&self) -> Option<&ServerMetadata> {
        self.value::<ServerMetadataSlot>().map(|slot| &slot.0)
    }
}

/// Derive a context from `ctx` carrying `md`
pub fn new_server_metadata_context(ctx: &CallContext, md: ServerMetadata) -> CallContext {
    ctx.with_server_metadata(md)
}

/// Server metadata in `ctx`.
///
/// Returns an empty record and `false` when none was attached.
pub fn server_metadata_from_context(ctx: &CallContext) -> (ServerMetadata, bool) {
    match ctx.server_metadata() {
        Some(md) => (md.clone(), true),
        None => (ServerMetadata::default(), false),
    }
}
