//! HTTP to RPC metadata bridging for the Quill gateway.
//!
//! This crate owns the rules for moving metadata across the HTTP/RPC seam:
//! - Request side: an inbound HTTP request is filtered through a
//!   [`MetadataPolicy`] into [`MetadataPairs`] attached to a [`CallContext`]
//! - Response side: header and trailer metadata returned by the RPC server are
//!   carried back as a [`ServerMetadata`] record on the same context
//!
//! ```
//! use quill_metadata::{annotate_context, CallContext};
//!
//! let req = http::Request::builder()
//!     .uri("/v1/users/42")
//!     .header("authorization", "Bearer xyz")
//!     .body(())
//!     .unwrap();
//!
//! let ctx = annotate_context(&CallContext::new(), &req);
//! let md = ctx.incoming_metadata().unwrap();
//! assert_eq!(md.get("Authorization"), Some("Bearer xyz"));
//! ```

pub mod context;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod policy;
pub mod request;
pub mod server;

pub use context::CallContext;
pub use error::{MetadataError, MetadataResult};
pub use extract::annotate_context;
pub use metadata::{MetadataMap, MetadataPairs};
pub use policy::{canonical_header_key, HeaderMatch, HeaderRule, KeyTransform, MetadataPolicy};
pub use request::RequestView;
pub use server::{new_server_metadata_context, server_metadata_from_context, ServerMetadata};
