//! `PoolKey` (§3): the tuple of connection-construction parameters that
//! decide whether two requests may share a pooled connection.
//!
//! Only fields this core actually varies by are represented — there is no
//! client-certificate or custom-cipher-suite knob here, so those dimensions
//! from the wider construction-parameter space aren't part of the key.

use crate::tls::TlsVersionRange;
use crate::url::Scheme;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// `host:port` of the forward proxy in play, if any. Distinct proxies
    /// (or no proxy vs. a proxy) never share a pool.
    pub proxy: Option<(String, u16)>,
    pub verify: VerifyMode,
    /// Affects the bytes actually negotiated on the wire, so distinct ranges
    /// never share a pooled connection.
    pub tls_versions: TlsVersionRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifyMode {
    Verified,
    DangerNoVerify,
}

impl PoolKey {
    pub fn new(scheme: Scheme, host: &str, port: u16, proxy: Option<(String, u16)>, verify: VerifyMode) -> Self {
        Self::with_tls_versions(scheme, host, port, proxy, verify, TlsVersionRange::unbounded())
    }

    pub fn with_tls_versions(
        scheme: Scheme,
        host: &str,
        port: u16,
        proxy: Option<(String, u16)>,
        verify: VerifyMode,
        tls_versions: TlsVersionRange,
    ) -> Self {
        Self {
            scheme,
            host: host.to_string(),
            port,
            proxy,
            verify,
            tls_versions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_proxies_are_distinct_keys() {
        let a = PoolKey::new(Scheme::Https, "example.com", 443, None, VerifyMode::Verified);
        let b = PoolKey::new(
            Scheme::Https,
            "example.com",
            443,
            Some(("proxy.local".to_string(), 3128)),
            VerifyMode::Verified,
        );
        assert_ne!(a, b);
    }

    #[test]
    fn distinct_tls_version_ranges_are_distinct_keys() {
        use crate::tls::{TlsVersion, TlsVersionRange};
        let a = PoolKey::new(Scheme::Https, "h", 443, None, VerifyMode::Verified);
        let b = PoolKey::with_tls_versions(
            Scheme::Https,
            "h",
            443,
            None,
            VerifyMode::Verified,
            TlsVersionRange {
                min: Some(TlsVersion::Tls13),
                max: None,
            },
        );
        assert_ne!(a, b);
    }

    #[test]
    fn equal_fields_hash_equal() {
        use std::collections::HashSet;
        let a = PoolKey::new(Scheme::Http, "h", 80, None, VerifyMode::Verified);
        let b = PoolKey::new(Scheme::Http, "h", 80, None, VerifyMode::Verified);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
