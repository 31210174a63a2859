//! Status-line + header parsing (§4.1 "Response parsing").

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::Error;
use crate::header::HeaderBag;

/// Default aggregate cap on the status line + header block (§4.1).
pub const DEFAULT_MAX_HEADER_LIST_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http10,
    Http11,
}

#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub version: Version,
    pub headers: HeaderBag,
}

/// How the body is delimited, decided from the response head plus the
/// request method (§4.1 "Response parsing", last paragraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyLength {
    Empty,
    Chunked,
    Known(u64),
    Close,
}

impl ResponseHead {
    /// Decide body length per the fixed priority order in §4.1.
    pub fn body_length(&self, request_method: &str, informational_preceding: bool) -> BodyLength {
        let is_head = request_method.eq_ignore_ascii_case("HEAD");
        let is_1xx = (100..200).contains(&self.status);
        if is_head || is_1xx || self.status == 204 || self.status == 304 {
            return BodyLength::Empty;
        }
        // A CONNECT 2xx response never carries a body delimited this way —
        // callers handle that before reaching here by not calling this path.
        let _ = informational_preceding;

        if let Some(te) = self.headers.combined("transfer-encoding") {
            if te
                .split(',')
                .map(str::trim)
                .any(|tok| tok.eq_ignore_ascii_case("chunked"))
            {
                return BodyLength::Chunked;
            }
        }
        if let Some(cl) = self.headers.get("content-length") {
            if let Ok(n) = cl.trim().parse::<u64>() {
                return BodyLength::Known(n);
            }
        }
        BodyLength::Close
    }
}

/// Read and parse `HTTP/1.x SP CODE SP REASON CRLF` plus headers up to the
/// terminating blank line, from a buffered async reader.
pub async fn read_response_head<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_header_list_size: usize,
) -> Result<ResponseHead, Error> {
    let mut budget = max_header_list_size;

    let status_line = read_line(reader, &mut budget).await?;
    let (version, status, reason) = parse_status_line(&status_line)?;

    let mut headers = HeaderBag::new();
    loop {
        let line = read_line(reader, &mut budget).await?;
        if line.is_empty() {
            break;
        }
        let line = unfold_if_continuation(reader, line, &mut budget).await?;
        let (name, value) = parse_header_line(&line)?;
        headers.add(&name, &value)?;
    }

    Ok(ResponseHead {
        status,
        reason,
        version,
        headers,
    })
}

/// Reads a single CRLF-terminated line (CRLF stripped), enforcing the
/// aggregate header-list budget.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R, budget: &mut usize) -> Result<String, Error> {
    let mut raw = Vec::new();
    let n = reader
        .read_until(b'\n', &mut raw)
        .await
        .map_err(Error::from)?;
    if n == 0 {
        return Err(Error::Protocol("connection closed before response head completed".to_string()));
    }
    if raw.len() > *budget {
        return Err(Error::Protocol("response header block exceeds max_header_list_size".to_string()));
    }
    *budget -= raw.len();

    while raw.last() == Some(&b'\n') || raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw).map_err(|_| Error::Protocol("response header is not valid UTF-8".to_string()))
}

/// Obsolete line folding (RFC 7230 §3.2.4): a header value continuation line
/// starts with SP/HTAB. We fold it into the previous line as a single space,
/// never reflecting the folding itself onto the wire model.
async fn unfold_if_continuation<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    mut line: String,
    budget: &mut usize,
) -> Result<String, Error> {
    loop {
        let peeked = reader.fill_buf().await.map_err(Error::from)?;
        if matches!(peeked.first(), Some(b' ') | Some(b'\t')) {
            let cont = read_line(reader, budget).await?;
            line.push(' ');
            line.push_str(cont.trim_start());
        } else {
            return Ok(line);
        }
    }
}

fn parse_status_line(line: &str) -> Result<(Version, u16, String), Error> {
    let mut parts = line.splitn(3, ' ');
    let version_str = parts
        .next()
        .ok_or_else(|| Error::Protocol("missing HTTP version in status line".to_string()))?;
    let code_str = parts
        .next()
        .ok_or_else(|| Error::Protocol("missing status code in status line".to_string()))?;
    let reason = parts.next().unwrap_or("").to_string();

    let version = match version_str {
        "HTTP/1.1" => Version::Http11,
        "HTTP/1.0" => Version::Http10,
        other => return Err(Error::Protocol(format!("unsupported HTTP version '{other}'"))),
    };
    let status = code_str
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("invalid status code '{code_str}'")))?;

    Ok((version, status, reason))
}

fn parse_header_line(line: &str) -> Result<(String, String), Error> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::Protocol(format!("malformed header line '{line}'")))?;
    if name.is_empty() {
        return Err(Error::Protocol("empty header name".to_string()));
    }
    Ok((name.to_string(), value.trim().to_string()))
}
