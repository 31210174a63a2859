//! C12: forward-proxy configuration and routing decisions (§4.5, §4.12).

use base64::Engine;

use crate::header::HeaderBag;
use crate::url::{Scheme, Url};

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: Url,
    pub headers: HeaderBag,
    pub use_forwarding_for_https: bool,
}

impl ProxyConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            headers: HeaderBag::new(),
            use_forwarding_for_https: false,
        }
    }

    /// `Proxy-Authorization: Basic ...` derived from the proxy URL's
    /// userinfo, if present. Attached only to the CONNECT/forward request,
    /// never to the request eventually sent to the origin.
    pub fn authorization_header(&self, userinfo: Option<&str>) -> Option<String> {
        let userinfo = userinfo?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(userinfo.as_bytes());
        Some(format!("Basic {encoded}"))
    }
}

/// Which of §4.5's five routing cases applies to a given request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// No proxy; connect straight to the origin, plaintext.
    Direct,
    /// No proxy; connect straight to the origin, TLS.
    DirectTls,
    /// Plain HTTP proxy, plain HTTP origin: absolute-form request to the proxy.
    PlainForward,
    /// HTTP or HTTPS proxy, HTTPS origin: CONNECT tunnel, then TLS to origin.
    ConnectTunnel,
    /// HTTPS proxy, HTTP origin, forwarding opted in: TLS to proxy, absolute-form request.
    TlsForward,
}

pub fn decide_route(origin_scheme: Scheme, proxy: Option<&ProxyConfig>) -> Route {
    match (proxy, origin_scheme) {
        (None, Scheme::Http) => Route::Direct,
        (None, Scheme::Https) => Route::DirectTls,
        (Some(p), Scheme::Http) if p.url.scheme == Scheme::Https && p.use_forwarding_for_https => {
            Route::TlsForward
        }
        (Some(p), Scheme::Http) if p.url.scheme == Scheme::Http => Route::PlainForward,
        (Some(_), Scheme::Https) => Route::ConnectTunnel,
        (Some(_), Scheme::Http) => Route::PlainForward,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_proxy_routes_direct() {
        assert_eq!(decide_route(Scheme::Http, None), Route::Direct);
        assert_eq!(decide_route(Scheme::Https, None), Route::DirectTls);
    }

    #[test]
    fn https_origin_through_any_proxy_is_a_connect_tunnel() {
        let proxy = ProxyConfig::new(Url::parse("http://proxy.local:3128").unwrap());
        assert_eq!(decide_route(Scheme::Https, Some(&proxy)), Route::ConnectTunnel);
    }

    #[test]
    fn http_origin_through_plain_proxy_is_plain_forward() {
        let proxy = ProxyConfig::new(Url::parse("http://proxy.local:3128").unwrap());
        assert_eq!(decide_route(Scheme::Http, Some(&proxy)), Route::PlainForward);
    }

    #[test]
    fn http_origin_through_tls_proxy_with_forwarding_opt_in() {
        let mut proxy = ProxyConfig::new(Url::parse("https://proxy.local:3128").unwrap());
        proxy.use_forwarding_for_https = true;
        assert_eq!(decide_route(Scheme::Http, Some(&proxy)), Route::TlsForward);
    }

    #[test]
    fn authorization_header_is_basic_base64() {
        let proxy = ProxyConfig::new(Url::parse("http://proxy.local:3128").unwrap());
        let header = proxy.authorization_header(Some("user:pass")).unwrap();
        assert_eq!(header, "Basic dXNlcjpwYXNz");
    }
}
