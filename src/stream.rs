//! C6: response body reader — draining a [`Connection`] according to the
//! body-length mode §4.1 decided, and marking the connection reusable (or
//! not) as the body is consumed (§4.2 open question 2).

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;

use crate::connection::Connection;
use crate::error::Error;
use crate::header::HeaderBag;
use crate::timeout::Deadline;
use crate::wire::chunked::ChunkedReader;
use crate::wire::decode::{self, Coding};
use crate::wire::response::BodyLength;

enum BodyState {
    Known(u64),
    Chunked { reader: ChunkedReader, pending: Bytes },
    Empty,
    /// No length indicator at all — delimited by the peer closing the
    /// connection. Never reusable once drained.
    Close,
}

/// Reads one response body to completion and reflects that completion back
/// onto the connection's reusability.
pub struct ResponseBody<'a> {
    conn: &'a mut Connection,
    state: BodyState,
    deadline: Deadline,
}

impl<'a> ResponseBody<'a> {
    /// `deadline`'s read budget (§4.3) bounds every socket read the body
    /// drain performs, the same as the response-head read — a peer that
    /// goes silent mid-body must not hang the caller indefinitely.
    pub fn new(conn: &'a mut Connection, length: BodyLength, deadline: Deadline) -> Self {
        let state = match length {
            BodyLength::Empty => {
                conn.finish_response(true);
                BodyState::Empty
            }
            BodyLength::Known(0) => {
                conn.finish_response(true);
                BodyState::Known(0)
            }
            BodyLength::Known(n) => BodyState::Known(n),
            BodyLength::Chunked => BodyState::Chunked {
                reader: ChunkedReader::new(),
                pending: Bytes::new(),
            },
            BodyLength::Close => BodyState::Close,
        };
        Self { conn, state, deadline }
    }

    pub fn is_finished(&self) -> bool {
        match &self.state {
            BodyState::Empty => true,
            BodyState::Known(remaining) => *remaining == 0,
            BodyState::Chunked { reader, pending } => reader.is_done() && pending.is_empty(),
            BodyState::Close => false,
        }
    }

    /// Trailers accumulated so far (populated only once a chunked body has
    /// finished).
    pub fn trailers(&self) -> Option<&HeaderBag> {
        match &self.state {
            BodyState::Chunked { reader, .. } => Some(reader.trailers()),
            _ => None,
        }
    }

    /// Raw (still content-encoded) bytes. Returns `Ok(0)` at body end.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match &mut self.state {
            BodyState::Empty => Ok(0),
            BodyState::Known(remaining) => {
                if *remaining == 0 {
                    return Ok(0);
                }
                let want = buf.len().min(*remaining as usize);
                if want == 0 {
                    return Ok(0);
                }
                let n = with_read_budget(&self.deadline, async {
                    self.conn.reader().read(&mut buf[..want]).await.map_err(Error::from)
                })
                .await?;
                if n == 0 {
                    return Err(Error::Protocol(
                        "connection closed before the declared content-length was read".to_string(),
                    ));
                }
                *remaining -= n as u64;
                if *remaining == 0 {
                    self.conn.finish_response(true);
                }
                Ok(n)
            }
            BodyState::Chunked { reader, pending } => {
                if pending.is_empty() {
                    if reader.is_done() {
                        return Ok(0);
                    }
                    match with_read_budget(&self.deadline, reader.next_chunk(self.conn.reader())).await? {
                        Some(chunk) => *pending = chunk,
                        None => {
                            self.conn.finish_response(true);
                            return Ok(0);
                        }
                    }
                }
                let n = buf.len().min(pending.len());
                buf[..n].copy_from_slice(&pending[..n]);
                let _ = pending.split_to(n);
                Ok(n)
            }
            BodyState::Close => {
                let n = with_read_budget(&self.deadline, async {
                    self.conn.reader().read(buf).await.map_err(Error::from)
                })
                .await?;
                if n == 0 {
                    self.conn.finish_response(false);
                    self.conn.close().await;
                }
                Ok(n)
            }
        }
    }

    pub async fn read_to_end(&mut self) -> Result<Bytes, Error> {
        let mut out = BytesMut::new();
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out.freeze())
    }

    /// Abandon the body before it's fully drained. The connection is never
    /// reusable in this case (§4.2 open question 2): a half-read body would
    /// desynchronize the next request's framing.
    pub async fn abandon(mut self) {
        if !self.is_finished() {
            self.conn.finish_response(false);
            self.conn.close().await;
        }
    }
}

/// Bounds a single body read by the deadline's remaining read/total budget,
/// mapping an elapsed timeout to the same error a stalled head read raises.
async fn with_read_budget<T>(
    deadline: &Deadline,
    fut: impl std::future::Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    deadline.check_total()?;
    match deadline.read_timeout() {
        Some(d) => tokio::time::timeout(d, fut).await.map_err(|_| Error::ReadTimeout)?,
        None => fut.await,
    }
}

/// Reads the full body and applies the content-decoder chain named by
/// `Content-Encoding`, if any.
pub async fn read_decoded(
    body: &mut ResponseBody<'_>,
    content_encoding: Option<&str>,
    max_chain: usize,
    max_decoded_bytes: u64,
) -> Result<Bytes, Error> {
    let raw = body.read_to_end().await?;
    let codings: Vec<Coding> = match content_encoding {
        Some(value) => decode::parse_chain(value, max_chain)?,
        None => Vec::new(),
    };
    if codings.is_empty() {
        return Ok(raw);
    }
    decode::decode_chain(tokio::io::BufReader::new(std::io::Cursor::new(raw.to_vec())), &codings, max_decoded_bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::key::{PoolKey, VerifyMode};
    use crate::resolver::TokioResolver;
    use crate::tls::TlsConnectorFactory;
    use crate::url::Scheme;

    async fn connected_pair(response_prefix: &'static [u8]) -> (Connection, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            tokio::io::AsyncWriteExt::write_all(&mut sock, response_prefix)
                .await
                .unwrap();
            // keep the socket open briefly so the client's read completes
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        });

        let key = PoolKey::new(Scheme::Http, "127.0.0.1", addr.port(), None, VerifyMode::Verified);
        let resolver = TokioResolver;
        let factory = TlsConnectorFactory::verified().unwrap();
        let deadline = crate::timeout::Timeout::default().start();
        let conn = Connection::connect(key, &resolver, &factory, None, crate::forward_proxy::Route::Direct, &deadline)
            .await
            .unwrap();
        (conn, server)
    }

    #[tokio::test]
    async fn known_length_body_reads_exact_bytes_and_marks_reusable() {
        let (mut conn, server) = connected_pair(b"hello").await;
        let deadline = crate::timeout::Timeout::default().start();
        let mut body = ResponseBody::new(&mut conn, BodyLength::Known(5), deadline);
        let data = body.read_to_end().await.unwrap();
        assert_eq!(&data[..], b"hello");
        drop(body);
        assert!(conn.is_reusable());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn chunked_body_reads_across_chunk_boundaries() {
        let (mut conn, server) = connected_pair(b"5\r\nhello\r\n0\r\n\r\n").await;
        let deadline = crate::timeout::Timeout::default().start();
        let mut body = ResponseBody::new(&mut conn, BodyLength::Chunked, deadline);
        let data = body.read_to_end().await.unwrap();
        assert_eq!(&data[..], b"hello");
        drop(body);
        assert!(conn.is_reusable());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn close_delimited_body_is_never_reusable() {
        let (mut conn, server) = connected_pair(b"hello").await;
        let deadline = crate::timeout::Timeout::default().start();
        let mut body = ResponseBody::new(&mut conn, BodyLength::Close, deadline);
        let data = body.read_to_end().await.unwrap();
        assert_eq!(&data[..], b"hello");
        drop(body);
        assert!(!conn.is_reusable());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn empty_body_marks_reusable_immediately() {
        let (mut conn, server) = connected_pair(b"").await;
        let deadline = crate::timeout::Timeout::default().start();
        let body = ResponseBody::new(&mut conn, BodyLength::Empty, deadline);
        assert!(body.is_finished());
        drop(body);
        assert!(conn.is_reusable());
        server.await.unwrap();
    }
}
