//! Blocking client for JSON REST APIs that wrap every body in a
//! `{"meta": ..., "data": ...}` envelope.
//!
//! # Overview
//! `RestClient` builds resource URLs, sends requests through a `Transport`,
//! returns the envelope's `data`, and turns failing statuses into `ApiError`
//! variants. `Resource` binds a client to one resource type.
//!
//! # Design
//! - Requests and responses are plain data (`HttpRequest`, `HttpResponse`);
//!   `UreqTransport` performs the I/O by default and tests swap in their own.
//! - Status dispatch is a single `match` in `ApiError::from_response`.
//! - `record::normalize` is opt-in: loaded records come back exactly as the
//!   server sent them.

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod record;
pub mod resource;
pub mod transport;

pub use client::{Created, RestClient, Result};
pub use config::ClientConfig;
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use record::{normalize, Record};
pub use resource::Resource;
pub use transport::{Transport, UreqTransport};
