//! C8: request facade — assembles the final header set and picks body
//! framing before the wire codec ever runs (§4.8).

use bytes::Bytes;

use crate::forward_proxy::Route;
use crate::header::HeaderBag;
use crate::url::Url;
use crate::wire::request::BodyFraming;

pub const DEFAULT_SUPPORTED_CODINGS: &[&str] = &["gzip", "deflate", "br", "zstd"];

#[derive(Debug, Clone)]
pub enum BodySpec {
    None,
    Bytes(Bytes),
    /// Length unknown ahead of time (a reader/iterable source) — always
    /// sent chunked.
    Streamed,
}

/// Builds the header set for one request: caller headers take precedence,
/// then client-level defaults, then the facade's own baked-in defaults
/// (`Host`, `User-Agent`, `Accept-Encoding`).
pub fn build_headers(
    caller_headers: &HeaderBag,
    client_defaults: &HeaderBag,
    url: &Url,
    decode_content: bool,
) -> Result<HeaderBag, crate::error::Error> {
    let mut headers = caller_headers.clone();
    if !headers.contains("host") {
        headers.set("host", &url.host_header())?;
    }
    headers.merge_defaults(client_defaults);
    if !headers.contains("user-agent") {
        headers.set("user-agent", concat!("hermes-http/", env!("CARGO_PKG_VERSION")))?;
    }
    if decode_content && !headers.contains("accept-encoding") {
        headers.set("accept-encoding", &DEFAULT_SUPPORTED_CODINGS.join(", "))?;
    }
    Ok(headers)
}

/// Picks the C1 body-framing mode and whether the caller passed a body at
/// all (needed to decide whether GET/HEAD get a synthetic
/// `Content-Length: 0`).
pub fn choose_framing(body: &BodySpec) -> (BodyFraming, bool) {
    match body {
        BodySpec::None => (BodyFraming::Empty, false),
        BodySpec::Bytes(b) => (BodyFraming::KnownLength(b.len() as u64), true),
        BodySpec::Streamed => (BodyFraming::Chunked, true),
    }
}

/// Origin-form for a direct (or CONNECT-tunneled) connection; absolute-form
/// when the request actually travels to a plain-HTTP forward proxy.
pub fn request_target(url: &Url, route: Route) -> String {
    match route {
        Route::PlainForward | Route::TlsForward => url.absolute_form(),
        Route::Direct | Route::DirectTls | Route::ConnectTunnel => url.origin_form(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_host_and_user_agent_and_accept_encoding() {
        let url = Url::parse("http://example.com/a").unwrap();
        let headers = build_headers(&HeaderBag::new(), &HeaderBag::new(), &url, true).unwrap();
        assert_eq!(headers.get("host"), Some("example.com"));
        assert!(headers.get("user-agent").unwrap().starts_with("hermes-http/"));
        assert_eq!(headers.get("accept-encoding"), Some("gzip, deflate, br, zstd"));
    }

    #[test]
    fn caller_headers_take_precedence_over_defaults() {
        let url = Url::parse("http://example.com/a").unwrap();
        let mut caller = HeaderBag::new();
        caller.add("User-Agent", "custom/1.0").unwrap();
        let headers = build_headers(&caller, &HeaderBag::new(), &url, true).unwrap();
        assert_eq!(headers.get("user-agent"), Some("custom/1.0"));
    }

    #[test]
    fn decode_content_false_omits_accept_encoding() {
        let url = Url::parse("http://example.com/a").unwrap();
        let headers = build_headers(&HeaderBag::new(), &HeaderBag::new(), &url, false).unwrap();
        assert!(!headers.contains("accept-encoding"));
    }

    #[test]
    fn known_body_length_framing() {
        let (framing, has_body) = choose_framing(&BodySpec::Bytes(Bytes::from_static(b"abc")));
        assert!(matches!(framing, BodyFraming::KnownLength(3)));
        assert!(has_body);
    }

    #[test]
    fn plain_forward_route_uses_absolute_form() {
        let url = Url::parse("http://example.com/a?b=1").unwrap();
        assert_eq!(
            request_target(&url, Route::PlainForward),
            "http://example.com/a?b=1"
        );
        assert_eq!(request_target(&url, Route::Direct), "/a?b=1");
    }
}
