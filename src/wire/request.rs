//! Request line + header serialization (§4.1 "Request serialization").

use bytes::{BufMut, BytesMut};

use crate::error::Error;
use crate::header::HeaderBag;

/// Chosen by the facade (C8) before the wire codec ever runs — exactly one
/// applies per request (§4.1 "Body framing").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// `Content-Length: N`, exactly N bytes follow.
    KnownLength(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// No body at all — `Content-Length: 0` is emitted unless the method is
    /// one of the bodyless-by-convention methods with no body argument.
    Empty,
}

pub struct RequestLine<'a> {
    pub method: &'a str,
    pub target: &'a str,
}

/// Methods that omit both `Content-Length` and `Transfer-Encoding` when the
/// caller passed no body at all (§4.1).
fn omits_empty_body_headers(method: &str) -> bool {
    matches!(
        method.to_ascii_uppercase().as_str(),
        "GET" | "HEAD" | "DELETE" | "OPTIONS" | "TRACE" | "CONNECT"
    )
}

/// Serialize the request line and header block (everything up to and
/// including the terminating blank line). The caller writes the body bytes
/// (or chunk frames) separately via [`write_chunk`]/`KnownLength`'s raw bytes.
pub fn serialize_head(
    line: RequestLine<'_>,
    headers: &HeaderBag,
    framing: BodyFraming,
    caller_passed_body: bool,
) -> Result<BytesMut, Error> {
    validate_request_target(line.target)?;

    let mut buf = BytesMut::with_capacity(128 + headers.len() * 32);
    buf.put_slice(line.method.as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(line.target.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");

    for (name, value) in headers.iter() {
        buf.put_slice(name.as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }

    match framing {
        BodyFraming::KnownLength(n) if !headers.contains("content-length") => {
            buf.put_slice(b"content-length: ");
            buf.put_slice(n.to_string().as_bytes());
            buf.put_slice(b"\r\n");
        }
        BodyFraming::Chunked if !headers.contains("transfer-encoding") => {
            buf.put_slice(b"transfer-encoding: chunked\r\n");
        }
        BodyFraming::Empty
            if !caller_passed_body
                && !omits_empty_body_headers(line.method)
                && !headers.contains("content-length") =>
        {
            buf.put_slice(b"content-length: 0\r\n");
        }
        _ => {}
    }

    buf.put_slice(b"\r\n");
    Ok(buf)
}

/// Encode one chunk: `<hex-size>\r\n<data>\r\n`. Pass an empty slice for the
/// terminating `0\r\n\r\n` chunk (trailers, if any, go between the size line
/// and the final CRLF — callers append those themselves).
pub fn write_chunk(data: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(data.len() + 16);
    buf.put_slice(format!("{:x}", data.len()).as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
    buf
}

pub fn final_chunk() -> &'static [u8] {
    b"0\r\n\r\n"
}

fn validate_request_target(target: &str) -> Result<(), Error> {
    if target.is_empty() || target.bytes().any(|b| b == b'\r' || b == b'\n' || b == b' ') {
        return Err(Error::Protocol(format!("invalid request-target '{target}'")));
    }
    Ok(())
}
