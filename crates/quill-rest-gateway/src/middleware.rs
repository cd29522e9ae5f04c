//! Middleware for REST gateway

pub mod metadata;

pub use metadata::MetadataMiddleware;
