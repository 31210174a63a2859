//! Pooled, retry-aware HTTP/1.1 client core.
//!
//! [`client::Client`] is the entry point: it wires the request facade, the
//! retry/redirect controller, the per-origin connection pools, and the
//! hand-rolled HTTP/1.1 wire codec together behind a single
//! [`client::Client::request`] call. [`global`] offers an optional
//! process-wide default instance for callers who don't want to thread a
//! `Client` through their own state.

pub mod client;
pub mod connection;
pub mod error;
pub mod facade;
pub mod forward_proxy;
pub mod global;
pub mod header;
pub mod pool;
pub mod resolver;
pub mod retry;
pub mod stream;
pub mod timeout;
pub mod tls;
pub mod transport;
pub mod url;
pub mod wire;

pub use client::{Client, ClientConfig, Response};
pub use error::Error;
pub use facade::BodySpec;
pub use forward_proxy::ProxyConfig;
pub use header::HeaderBag;
pub use retry::Retry;
pub use timeout::Timeout;
pub use tls::TlsVersion;
pub use url::Url;
