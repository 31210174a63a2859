//! C9: TLS connector construction — rustls on top of the `ring` crypto
//! provider, with an explicit danger/no-verify escape hatch.

use std::sync::Arc;

use tokio_rustls::{rustls, TlsConnector as RustlsTlsConnector};

use crate::error::Error;

/// A TLS protocol version this core will negotiate, independent of rustls's
/// own version type so pool keys and config don't need to depend on rustls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls12,
    Tls13,
}

impl TlsVersion {
    fn to_rustls(self) -> &'static rustls::SupportedProtocolVersion {
        match self {
            TlsVersion::Tls12 => &rustls::version::TLS12,
            TlsVersion::Tls13 => &rustls::version::TLS13,
        }
    }
}

/// `tls_min_version`/`tls_max_version` (§3, §6): the inclusive range of TLS
/// versions the connector is willing to negotiate. `None` on either end
/// leaves rustls's own default for that bound in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TlsVersionRange {
    pub min: Option<TlsVersion>,
    pub max: Option<TlsVersion>,
}

impl TlsVersionRange {
    pub const fn unbounded() -> Self {
        Self { min: None, max: None }
    }

    /// The concrete version list to pass to
    /// `ClientConfig::builder_with_protocol_versions`, honoring both bounds.
    fn protocol_versions(self) -> Vec<&'static rustls::SupportedProtocolVersion> {
        const ALL: [TlsVersion; 2] = [TlsVersion::Tls12, TlsVersion::Tls13];
        ALL.iter()
            .copied()
            .filter(|v| self.min.map_or(true, |min| *v >= min))
            .filter(|v| self.max.map_or(true, |max| *v <= max))
            .map(TlsVersion::to_rustls)
            .collect()
    }
}

/// A rustls `ServerCertVerifier` that accepts any certificate without
/// validation. Exists only for the explicit opt-in `danger_no_verify` mode —
/// encryption without peer identity verification, e.g. a self-signed test
/// fixture or a mesh sidecar that authenticates another way.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Builds `tokio_rustls::TlsConnector`s. Kept as a small struct (rather than
/// a bare function) so alternate CA bundles or client-auth certs can be
/// threaded in later without changing every call site.
#[derive(Clone)]
pub struct TlsConnectorFactory {
    config: Arc<rustls::ClientConfig>,
}

impl TlsConnectorFactory {
    /// Verified mode: webpki's bundled Mozilla root store, standard chain
    /// validation, no client certificate.
    pub fn verified() -> Result<Self, Error> {
        Self::verified_with_versions(TlsVersionRange::unbounded())
    }

    pub fn verified_with_versions(versions: TlsVersionRange) -> Result<Self, Error> {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_protocol_versions(&versions.protocol_versions())
            .with_root_certificates(roots)
            .with_no_client_auth();

        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Danger mode: TLS is used for transport encryption only, peer identity
    /// is never checked. Must be opted into explicitly by the caller.
    pub fn danger_no_verify() -> Self {
        Self::danger_no_verify_with_versions(TlsVersionRange::unbounded())
    }

    pub fn danger_no_verify_with_versions(versions: TlsVersionRange) -> Self {
        let config = rustls::ClientConfig::builder_with_protocol_versions(&versions.protocol_versions())
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth();

        Self {
            config: Arc::new(config),
        }
    }

    pub fn connector(&self) -> RustlsTlsConnector {
        RustlsTlsConnector::from(self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_factory_builds_without_error() {
        let factory = TlsConnectorFactory::verified().unwrap();
        let _connector = factory.connector();
    }

    #[test]
    fn danger_factory_builds_without_error() {
        let factory = TlsConnectorFactory::danger_no_verify();
        let _connector = factory.connector();
    }

    #[test]
    fn pinning_to_tls12_only_builds_without_error() {
        let versions = TlsVersionRange {
            min: Some(TlsVersion::Tls12),
            max: Some(TlsVersion::Tls12),
        };
        let factory = TlsConnectorFactory::verified_with_versions(versions).unwrap();
        let _connector = factory.connector();
    }

    #[test]
    fn version_range_filters_to_the_requested_bounds() {
        let versions = TlsVersionRange {
            min: Some(TlsVersion::Tls13),
            max: None,
        };
        assert_eq!(versions.protocol_versions().len(), 1);

        let versions = TlsVersionRange::unbounded();
        assert_eq!(versions.protocol_versions().len(), 2);
    }
}
