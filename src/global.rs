//! C10: an optional process-wide default [`Client`], built lazily on first
//! use. Constructing and using a private `Client` directly never touches
//! this — the global is purely an opt-in convenience, not a hidden
//! dependency of the rest of the crate.

use std::sync::OnceLock;

use tracing::info;

use crate::client::{Client, ClientConfig};
use crate::error::Error;

static GLOBAL: OnceLock<Client> = OnceLock::new();

/// The shared default client, built with [`ClientConfig::default`] the
/// first time this is called.
pub fn client() -> &'static Client {
    GLOBAL.get_or_init(|| Client::new(ClientConfig::default()).expect("default client config is always valid"))
}

/// Drain every pool the global client holds. Idempotent; safe to call even
/// if the global was never touched (a no-op in that case).
pub async fn shutdown() -> Result<(), Error> {
    if let Some(client) = GLOBAL.get() {
        info!("closing all pooled connections held by the global client");
        client.close().await;
    }
    Ok(())
}
