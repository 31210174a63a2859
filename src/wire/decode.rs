//! Content-decoder chain (§4.1 "Content decoding", §4.6).
//!
//! `Content-Encoding` may list multiple codings, applied in the order the
//! sender applied them, so the reader undoes them right-to-left (the header
//! is already in apply order, so decoding walks the list in reverse).

use async_compression::tokio::bufread::{BrotliDecoder, DeflateDecoder, GzipDecoder, ZlibDecoder, ZstdDecoder};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, BufReader};

use crate::error::Error;

/// Refuse to chain more than this many codings (§4.6 default cap — a
/// malicious/misconfigured peer can otherwise force unbounded CPU/memory
/// through a long `Content-Encoding` list).
pub const DEFAULT_MAX_DECODER_CHAIN: usize = 5;

/// Caps total decompressed bytes produced for one response body, guarding
/// against decompression-bomb payloads.
pub const DEFAULT_DECODE_MAX_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl Coding {
    pub fn parse(token: &str) -> Result<Self, Error> {
        match token.trim().to_ascii_lowercase().as_str() {
            "identity" => Ok(Coding::Identity),
            "gzip" | "x-gzip" => Ok(Coding::Gzip),
            "deflate" => Ok(Coding::Deflate),
            "br" => Ok(Coding::Brotli),
            "zstd" => Ok(Coding::Zstd),
            other => Err(Error::Decode(format!("unsupported content-encoding '{other}'"))),
        }
    }
}

/// Parse a `Content-Encoding` header value into the list of codings applied,
/// in apply order, enforcing the chain-length cap.
pub fn parse_chain(header_value: &str, max_chain: usize) -> Result<Vec<Coding>, Error> {
    let codings: Vec<Coding> = header_value
        .split(',')
        .map(Coding::parse)
        .collect::<Result<_, _>>()?;
    if codings.len() > max_chain {
        return Err(Error::Decode(format!(
            "content-encoding chain of {} exceeds max of {max_chain}",
            codings.len()
        )));
    }
    Ok(codings)
}

/// Wraps an inner async byte source with a chain of decompressors, applied
/// innermost (last-applied-by-sender) first, enforcing a total-output cap.
pub struct DecoderChain<R> {
    inner: Inner<R>,
    produced: u64,
    max_bytes: u64,
}

enum Inner<R> {
    Identity(BufReader<R>),
    Gzip(Box<GzipDecoder<BufReader<R>>>),
    /// zlib-wrapped deflate (RFC 1950) — what the `deflate` coding is
    /// supposed to mean and what most servers actually send.
    Zlib(Box<ZlibDecoder<BufReader<R>>>),
    /// Raw deflate (RFC 1951, no zlib header) — the fallback some servers
    /// send instead under the same `deflate` token.
    RawDeflate(Box<DeflateDecoder<BufReader<R>>>),
    Brotli(Box<BrotliDecoder<BufReader<R>>>),
    Zstd(Box<ZstdDecoder<BufReader<R>>>),
}

impl<R> DecoderChain<R>
where
    R: AsyncRead + Unpin,
{
    /// Build a chain for `codings` (apply order, as from [`parse_chain`]).
    /// Only single-coding chains are materialized directly; longer chains
    /// nest by wrapping the previous chain's output, constructed by the
    /// caller one coding at a time via [`DecoderChain::push`].
    ///
    /// `Coding::Deflate` builds the zlib-wrapped variant; callers needing
    /// the raw-deflate fallback use [`DecoderChain::new_raw_deflate`]
    /// instead (see `decode_one`, which tries both).
    pub fn new(inner: R, first: Coding, max_bytes: u64) -> Self {
        let reader = BufReader::new(inner);
        let inner = match first {
            Coding::Identity => Inner::Identity(reader),
            Coding::Gzip => Inner::Gzip(Box::new(GzipDecoder::new(reader))),
            Coding::Deflate => Inner::Zlib(Box::new(ZlibDecoder::new(reader))),
            Coding::Brotli => Inner::Brotli(Box::new(BrotliDecoder::new(reader))),
            Coding::Zstd => Inner::Zstd(Box::new(ZstdDecoder::new(reader))),
        };
        Self {
            inner,
            produced: 0,
            max_bytes,
        }
    }

    /// Raw-deflate (no zlib wrapper) variant, for the fallback path when
    /// zlib-wrapped inflate fails to parse.
    fn new_raw_deflate(inner: R, max_bytes: u64) -> Self {
        let reader = BufReader::new(inner);
        Self {
            inner: Inner::RawDeflate(Box::new(DeflateDecoder::new(reader))),
            produced: 0,
            max_bytes,
        }
    }

    pub async fn read_to_end_capped(mut self) -> Result<Bytes, Error> {
        let mut out = BytesMut::new();
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = self.read_chunk(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out.freeze())
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let n = match &mut self.inner {
            Inner::Identity(r) => r.read(buf).await,
            Inner::Gzip(r) => r.read(buf).await,
            Inner::Zlib(r) => r.read(buf).await,
            Inner::RawDeflate(r) => r.read(buf).await,
            Inner::Brotli(r) => r.read(buf).await,
            Inner::Zstd(r) => r.read(buf).await,
        }
        .map_err(|e| Error::Decode(e.to_string()))?;

        self.produced += n as u64;
        if self.produced > self.max_bytes {
            return Err(Error::Decode(format!(
                "decoded body exceeds decode_max_bytes ({} bytes)",
                self.max_bytes
            )));
        }
        Ok(n)
    }
}

/// Chains multiple codings by repeatedly feeding one decoder's fully
/// materialized output into the next. Bounded by `max_bytes` at every stage.
pub async fn decode_chain<R: AsyncBufRead + Unpin>(
    reader: R,
    codings: &[Coding],
    max_bytes: u64,
) -> Result<Bytes, Error> {
    if codings.is_empty() || codings == [Coding::Identity] {
        let mut out = Vec::new();
        let mut reader = reader;
        reader
            .read_to_end(&mut out)
            .await
            .map_err(|e| Error::Decode(e.to_string()))?;
        if out.len() as u64 > max_bytes {
            return Err(Error::Decode("decoded body exceeds decode_max_bytes".to_string()));
        }
        return Ok(Bytes::from(out));
    }

    // Undo in reverse of apply order: the last coding applied by the sender
    // is the outermost wrapper and must be peeled off first.
    let mut current: Bytes = {
        let mut out = Vec::new();
        let mut reader = reader;
        reader
            .read_to_end(&mut out)
            .await
            .map_err(|e| Error::Decode(e.to_string()))?;
        Bytes::from(out)
    };

    for coding in codings.iter().rev() {
        current = decode_one(current, *coding, max_bytes).await?;
    }
    Ok(current)
}

/// Undo a single coding. `deflate` is ambiguous in the wild (RFC 2616 names
/// zlib-wrapped deflate, but plenty of servers send raw deflate under the
/// same token) — urllib3 handles this by trying zlib-wrapped inflate first
/// and retrying as raw deflate if that fails to parse, which this mirrors.
async fn decode_one(data: Bytes, coding: Coding, max_bytes: u64) -> Result<Bytes, Error> {
    if coding != Coding::Deflate {
        let cursor = std::io::Cursor::new(data.to_vec());
        return DecoderChain::new(cursor, coding, max_bytes).read_to_end_capped().await;
    }

    let cursor = std::io::Cursor::new(data.to_vec());
    match DecoderChain::new(cursor, Coding::Deflate, max_bytes).read_to_end_capped().await {
        Ok(bytes) => Ok(bytes),
        Err(_) => {
            let cursor = std::io::Cursor::new(data.to_vec());
            DecoderChain::new_raw_deflate(cursor, max_bytes).read_to_end_capped().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_codings() {
        assert_eq!(Coding::parse("gzip").unwrap(), Coding::Gzip);
        assert_eq!(Coding::parse("br").unwrap(), Coding::Brotli);
        assert_eq!(Coding::parse("IDENTITY").unwrap(), Coding::Identity);
    }

    #[test]
    fn rejects_unknown_coding() {
        assert!(Coding::parse("compress").is_err());
    }

    #[test]
    fn parse_chain_splits_on_comma_and_enforces_cap() {
        let chain = parse_chain("gzip, identity", 5).unwrap();
        assert_eq!(chain, vec![Coding::Gzip, Coding::Identity]);
        assert!(parse_chain("gzip, br, zstd, gzip, br, zstd", 5).is_err());
    }

    #[tokio::test]
    async fn identity_chain_passes_bytes_through() {
        let data = b"hello world".to_vec();
        let reader = std::io::Cursor::new(data.clone());
        let out = decode_chain(tokio::io::BufReader::new(reader), &[Coding::Identity], 1024)
            .await
            .unwrap();
        assert_eq!(out.as_ref(), &data[..]);
    }
}
