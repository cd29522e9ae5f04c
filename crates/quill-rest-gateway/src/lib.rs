//! REST gateway middleware for Quill RPC services.
//!
//! This crate wires the metadata bridge into an axum router:
//! - Inbound requests are annotated with a [`CallContext`] holding the
//!   forwarded headers, request fields and cookies
//! - Server metadata attached by the handler is rendered back into the
//!   HTTP response as `Grpc-Metadata-*` and `Grpc-Trailer-*` headers

pub mod middleware;

pub use middleware::MetadataMiddleware;
pub use quill_metadata::{CallContext, MetadataPolicy, ServerMetadata};
