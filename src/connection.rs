//! C2: a single HTTP/1.1 connection over a [`Transport`], driven through
//! `NEW -> CONNECTING -> IDLE -> REQUEST_SENT -> RESPONSE_HEAD -> IDLE |
//! CLOSED` (§4.2).

use std::time::Instant;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::Error;
use crate::forward_proxy::Route;
use crate::header::HeaderBag;
use crate::pool::key::{PoolKey, VerifyMode};
use crate::resolver::Resolver;
use crate::timeout::Deadline;
use crate::tls::TlsConnectorFactory;
use crate::transport::Transport;
use crate::wire::request::{self, BodyFraming, RequestLine};
use crate::wire::response::{self, ResponseHead, DEFAULT_MAX_HEADER_LIST_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connecting,
    Idle,
    RequestSent,
    ResponseHead,
    Closed,
}

pub struct Connection {
    stream: BufReader<Transport>,
    key: PoolKey,
    state: State,
    created_at: Instant,
    last_used_at: Instant,
    use_count: u64,
    is_verified: bool,
    proxy_is_verified: bool,
    has_tunnel: bool,
}

/// Where to reach the peer for the initial TCP connect: either the origin
/// directly, or a forward proxy that will itself relay to the origin.
pub struct DialTarget<'a> {
    pub host: &'a str,
    pub port: u16,
}

impl Connection {
    /// Establish TCP (+ optional TLS, + optional proxy `CONNECT` tunnel) for
    /// `key`, honoring `deadline`'s connect-phase budget. `route` (already
    /// decided by the caller from the same origin scheme / proxy config that
    /// produced `key`) picks which of the five dial shapes applies.
    pub async fn connect(
        key: PoolKey,
        resolver: &dyn Resolver,
        tls_factory: &TlsConnectorFactory,
        proxy_target: Option<DialTarget<'_>>,
        route: Route,
        deadline: &Deadline,
    ) -> Result<Self, Error> {
        let dial = proxy_target.unwrap_or(DialTarget {
            host: &key.host,
            port: key.port,
        });

        let tcp = dial_tcp(dial.host, dial.port, resolver, deadline).await?;

        // `is_verified` covers the hop that actually carries the origin's
        // bytes-on-wire; `proxy_is_verified` covers the hop to the proxy
        // itself (§4.2) — the two are independent and must not be derived
        // from a single "is this transport TLS" bit.
        let (transport, is_verified, proxy_is_verified, has_tunnel) = match route {
            Route::Direct | Route::PlainForward => (Transport::Plain(tcp), false, false, false),
            Route::DirectTls => {
                let tls = handshake_tls(tcp, &key.host, tls_factory, deadline).await?;
                let verified = matches!(key.verify, VerifyMode::Verified);
                (Transport::DirectTls(Box::new(tls)), verified, false, false)
            }
            Route::ConnectTunnel => {
                // The CONNECT itself travels over the plain TCP socket just
                // dialed — this core doesn't yet TLS-wrap the hop to an
                // HTTPS proxy for tunneling, only TLS-to-origin once the
                // tunnel is up.
                let tunneled = establish_connect_tunnel(tcp, &key.host, key.port, deadline).await?;
                let tls = handshake_tls(tunneled, &key.host, tls_factory, deadline).await?;
                let verified = matches!(key.verify, VerifyMode::Verified);
                (Transport::TunneledTls(Box::new(tls)), verified, false, true)
            }
            Route::TlsForward => {
                let tls = handshake_tls(tcp, dial.host, tls_factory, deadline).await?;
                let verified = matches!(key.verify, VerifyMode::Verified);
                (Transport::TlsToProxy(Box::new(tls)), false, verified, false)
            }
        };

        transport.set_nodelay(true).map_err(Error::from)?;

        let now = Instant::now();
        Ok(Self {
            stream: BufReader::new(transport),
            key,
            state: State::Idle,
            created_at: now,
            last_used_at: now,
            use_count: 0,
            is_verified,
            proxy_is_verified,
            has_tunnel,
        })
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    pub fn use_count(&self) -> u64 {
        self.use_count
    }

    pub fn is_verified(&self) -> bool {
        self.is_verified
    }

    pub fn proxy_is_verified(&self) -> bool {
        self.proxy_is_verified
    }

    pub fn has_tunnel(&self) -> bool {
        self.has_tunnel
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Send the request line + headers, then flush. Caller writes the body
    /// (known-length raw bytes, or chunk frames via [`request::write_chunk`])
    /// separately through [`Connection::write_body_bytes`].
    pub async fn send_request_head(
        &mut self,
        line: RequestLine<'_>,
        headers: &HeaderBag,
        framing: BodyFraming,
        caller_passed_body: bool,
    ) -> Result<(), Error> {
        if self.state != State::Idle {
            return Err(Error::Protocol(
                "send_request_head called on a connection not in the IDLE state".to_string(),
            ));
        }
        let head = request::serialize_head(line, headers, framing, caller_passed_body)?;
        self.stream.get_mut().write_all(&head).await.map_err(Error::from)?;
        self.state = State::RequestSent;
        Ok(())
    }

    pub async fn write_body_bytes(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.state != State::RequestSent {
            return Err(Error::Protocol(
                "write_body_bytes called outside the REQUEST_SENT state".to_string(),
            ));
        }
        self.stream.get_mut().write_all(data).await.map_err(Error::from)
    }

    pub async fn flush(&mut self) -> Result<(), Error> {
        self.stream.get_mut().flush().await.map_err(Error::from)
    }

    /// Read and parse the response status line + headers, bounded by
    /// `deadline`'s read budget (§4.3) — a peer that sends the request but
    /// never answers must not hang the caller past `Timeout.read`.
    pub async fn read_response_head(&mut self, deadline: &Deadline) -> Result<ResponseHead, Error> {
        if self.state != State::RequestSent {
            return Err(Error::Protocol(
                "read_response_head called outside the REQUEST_SENT state".to_string(),
            ));
        }
        deadline.check_total()?;
        self.state = State::ResponseHead;
        self.use_count += 1;
        self.last_used_at = Instant::now();
        let read = response::read_response_head(&mut self.stream, DEFAULT_MAX_HEADER_LIST_SIZE);
        match deadline.read_timeout() {
            Some(d) => tokio::time::timeout(d, read).await.map_err(|_| Error::ReadTimeout)?,
            None => read.await,
        }
    }

    pub fn reader(&mut self) -> &mut BufReader<Transport> {
        &mut self.stream
    }

    /// Must be called once the response body (if any) has been fully
    /// consumed. Marks the connection reusable again unless `reusable` is
    /// false (e.g. the peer signaled `Connection: close`, or the body was
    /// abandoned before being drained — open question 2).
    pub fn finish_response(&mut self, reusable: bool) {
        self.state = if reusable { State::Idle } else { State::Closed };
    }

    pub fn is_reusable(&self) -> bool {
        self.state == State::Idle
    }

    /// Non-blocking zero-byte health probe: an idle connection whose peer
    /// already half-closed the socket reports a ready-but-empty buffer
    /// instead of pending. Used by the pool (C4) to drop dead idle
    /// connections before handing them out.
    pub fn peek_closed_by_peer(&mut self) -> bool {
        use std::task::{Context, Poll};
        use tokio::io::AsyncBufRead;

        let waker = futures_noop_waker();
        let mut cx = Context::from_waker(&waker);
        match std::pin::Pin::new(&mut self.stream).poll_fill_buf(&mut cx) {
            Poll::Ready(Ok(buf)) => buf.is_empty(),
            Poll::Ready(Err(_)) => true,
            Poll::Pending => false,
        }
    }

    pub async fn close(&mut self) {
        let _ = self.stream.get_mut().shutdown().await;
        self.state = State::Closed;
    }
}

fn futures_noop_waker() -> std::task::Waker {
    use std::task::{RawWaker, RawWakerVTable, Waker};
    fn no_op(_: *const ()) {}
    fn clone(_: *const ()) -> RawWaker {
        raw_waker()
    }
    fn raw_waker() -> RawWaker {
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
        RawWaker::new(std::ptr::null(), &VTABLE)
    }
    unsafe { Waker::from_raw(raw_waker()) }
}

async fn dial_tcp(
    host: &str,
    port: u16,
    resolver: &dyn Resolver,
    deadline: &Deadline,
) -> Result<TcpStream, Error> {
    let addrs = resolver.resolve(host, port).await?;
    let connect_budget = deadline.connect_timeout();

    let mut last_err = None;
    for addr in addrs {
        let attempt = TcpStream::connect(addr);
        let result = match connect_budget {
            Some(d) => tokio::time::timeout(d, attempt)
                .await
                .map_err(|_| Error::ConnectTimeout)
                .and_then(|r| r.map_err(|e| Error::Connect(e.to_string()))),
            None => attempt.await.map_err(|e| Error::Connect(e.to_string())),
        };
        match result {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Connect(format!("no route to '{host}:{port}'"))))
}

async fn handshake_tls(
    tcp: TcpStream,
    server_name_host: &str,
    factory: &TlsConnectorFactory,
    deadline: &Deadline,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>, Error> {
    let server_name = tokio_rustls::rustls::pki_types::ServerName::try_from(server_name_host.to_string())
        .map_err(|e| Error::Tls(format!("invalid server name '{server_name_host}': {e}")))?;

    let connector = factory.connector();
    let handshake = connector.connect(server_name, tcp);

    let result = match deadline.connect_timeout() {
        Some(d) => tokio::time::timeout(d, handshake)
            .await
            .map_err(|_| Error::ConnectTimeout)?,
        None => handshake.await,
    };
    result.map_err(|e| Error::Tls(e.to_string()))
}

/// Send `CONNECT host:port HTTP/1.1` to the proxy already dialed as `tcp`,
/// and require a `2xx` response before the tunnel is considered open.
async fn establish_connect_tunnel(
    mut tcp: TcpStream,
    origin_host: &str,
    origin_port: u16,
    deadline: &Deadline,
) -> Result<TcpStream, Error> {
    let target = format!("{origin_host}:{origin_port}");
    let mut headers = HeaderBag::new();
    headers.add("host", &target)?;

    let head = request::serialize_head(
        RequestLine {
            method: "CONNECT",
            target: &target,
        },
        &headers,
        BodyFraming::Empty,
        false,
    )?;

    let write = tcp.write_all(&head);
    match deadline.connect_timeout() {
        Some(d) => tokio::time::timeout(d, write)
            .await
            .map_err(|_| Error::ConnectTimeout)?
            .map_err(Error::from)?,
        None => write.await.map_err(Error::from)?,
    }

    let mut reader = BufReader::new(tcp);
    let head_future = response::read_response_head(&mut reader, DEFAULT_MAX_HEADER_LIST_SIZE);
    let head = match deadline.connect_timeout() {
        Some(d) => tokio::time::timeout(d, head_future)
            .await
            .map_err(|_| Error::ConnectTimeout)??,
        None => head_future.await?,
    };

    if !(200..300).contains(&head.status) {
        return Err(Error::Proxy(format!(
            "CONNECT tunnel rejected with status {}",
            head.status
        )));
    }

    Ok(reader.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::TokioResolver;
    use crate::url::Scheme;

    #[tokio::test]
    async fn connect_to_plain_http_listener_reaches_idle_state() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let key = PoolKey::new(Scheme::Http, "127.0.0.1", addr.port(), None, VerifyMode::Verified);
        let resolver = TokioResolver;
        let factory = TlsConnectorFactory::verified().unwrap();
        let deadline = crate::timeout::Timeout::default().start();

        let conn = Connection::connect(key, &resolver, &factory, None, crate::forward_proxy::Route::Direct, &deadline)
            .await
            .unwrap();
        assert!(conn.is_reusable());
        assert!(!conn.is_verified());
    }

    #[tokio::test]
    async fn full_request_response_round_trip_over_plain_tcp() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = tokio::io::AsyncReadExt::read(&mut sock, &mut buf).await.unwrap();
            assert!(String::from_utf8_lossy(&buf[..n]).starts_with("GET / HTTP/1.1"));
            tokio::io::AsyncWriteExt::write_all(
                &mut sock,
                b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi",
            )
            .await
            .unwrap();
        });

        let key = PoolKey::new(Scheme::Http, "127.0.0.1", addr.port(), None, VerifyMode::Verified);
        let resolver = TokioResolver;
        let factory = TlsConnectorFactory::verified().unwrap();
        let deadline = crate::timeout::Timeout::default().start();

        let mut conn = Connection::connect(key, &resolver, &factory, None, crate::forward_proxy::Route::Direct, &deadline)
            .await
            .unwrap();

        let mut headers = HeaderBag::new();
        headers.add("host", "127.0.0.1").unwrap();
        conn.send_request_head(
            RequestLine {
                method: "GET",
                target: "/",
            },
            &headers,
            BodyFraming::Empty,
            false,
        )
        .await
        .unwrap();
        conn.flush().await.unwrap();

        let head = conn.read_response_head(&deadline).await.unwrap();
        assert_eq!(head.status, 200);
        conn.finish_response(true);
        assert!(conn.is_reusable());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn stalled_peer_after_request_sent_raises_read_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            // Never writes a response; just holds the socket open.
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            drop(sock);
        });

        let key = PoolKey::new(Scheme::Http, "127.0.0.1", addr.port(), None, VerifyMode::Verified);
        let resolver = TokioResolver;
        let factory = TlsConnectorFactory::verified().unwrap();
        let timeout = crate::timeout::Timeout::new(
            Some(std::time::Duration::from_secs(5)),
            Some(std::time::Duration::from_millis(20)),
            None,
        );
        let deadline = timeout.start();

        let mut conn = Connection::connect(key, &resolver, &factory, None, crate::forward_proxy::Route::Direct, &deadline)
            .await
            .unwrap();

        let mut headers = HeaderBag::new();
        headers.add("host", "127.0.0.1").unwrap();
        conn.send_request_head(
            RequestLine {
                method: "GET",
                target: "/",
            },
            &headers,
            BodyFraming::Empty,
            false,
        )
        .await
        .unwrap();
        conn.flush().await.unwrap();

        let result = conn.read_response_head(&deadline).await;
        assert!(matches!(result, Err(Error::ReadTimeout)));

        server.abort();
    }
}
