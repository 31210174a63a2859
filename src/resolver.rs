//! C9: DNS resolution, pulled behind a trait so callers can plug in a
//! caching/overriding resolver for tests or service-mesh-style overrides.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::lookup_host;

use crate::error::Error;

#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, Error>;
}

/// Default resolver: delegates to the system resolver via
/// `tokio::net::lookup_host`, same as a plain `TcpStream::connect`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioResolver;

#[async_trait]
impl Resolver for TokioResolver {
    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, Error> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .map_err(|e| Error::Connect(format!("DNS resolution for '{host}' failed: {e}")))?
            .collect();
        if addrs.is_empty() {
            return Err(Error::Connect(format!("no addresses found for '{host}'")));
        }
        Ok(addrs)
    }
}
