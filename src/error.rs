use std::fmt;

use crate::url::Url;

/// Central error taxonomy for the client core (§7).
///
/// Hand-written `Display`/`Error` impls, matching the rest of this codebase's
/// convention (see the gateway's `GatewayError`) rather than a derive-macro
/// error crate.
#[derive(Debug)]
pub enum Error {
    /// Malformed or missing host, unknown scheme, or out-of-range port.
    InvalidUrl(String),
    /// DNS resolution or TCP connect failure.
    Connect(String),
    /// Connect-phase deadline exceeded.
    ConnectTimeout,
    /// Read-phase deadline exceeded.
    ReadTimeout,
    /// Framing/parse error, or unexpected EOF mid-message.
    Protocol(String),
    /// TLS handshake or verification failure.
    Tls(String),
    /// CONNECT tunnel setup failed; carries the proxy's response status if any.
    Proxy(String),
    /// `block=true` pool saturated past its wait timeout.
    EmptyPool,
    /// Malformed or over-long decoded body.
    Decode(String),
    /// Retry budget exhausted.
    MaxRetry { url: Url, reason: Box<Error> },
    /// Any other I/O error.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidUrl(msg) => write!(f, "invalid url: {msg}"),
            Error::Connect(msg) => write!(f, "connect error: {msg}"),
            Error::ConnectTimeout => write!(f, "connect timed out"),
            Error::ReadTimeout => write!(f, "read timed out"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Tls(msg) => write!(f, "tls error: {msg}"),
            Error::Proxy(msg) => write!(f, "proxy error: {msg}"),
            Error::EmptyPool => write!(f, "pool exhausted before a connection was released"),
            Error::Decode(msg) => write!(f, "content decoding error: {msg}"),
            Error::MaxRetry { url, reason } => {
                write!(f, "max retries exceeded for {url}: {reason}")
            }
            Error::Io(msg) => write!(f, "io error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::MaxRetry { reason, .. } => Some(reason.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Error::ReadTimeout,
            _ => Error::Io(e.to_string()),
        }
    }
}

impl Error {
    /// Whether the retry controller (C7) may consider retrying this error at
    /// all. Method/status-forcelist eligibility is decided separately by the
    /// caller; this only rules out the categories that are never retried.
    pub fn is_retry_eligible(&self) -> bool {
        !matches!(
            self,
            Error::InvalidUrl(_) | Error::Tls(_) | Error::Decode(_) | Error::MaxRetry { .. }
        )
    }

    /// Which `Retry` category this error decrements, if any (§4.7).
    pub fn retry_category(&self) -> Option<RetryCategory> {
        match self {
            Error::Connect(_) | Error::ConnectTimeout => Some(RetryCategory::Connect),
            Error::ReadTimeout | Error::Protocol(_) => Some(RetryCategory::Read),
            Error::Io(_) => Some(RetryCategory::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCategory {
    Connect,
    Read,
    Other,
    Status,
    Redirect,
}
