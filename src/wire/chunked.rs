//! Chunked transfer-coding reader state machine (§4.1, §4.6).
//!
//! `SIZE_LINE -> DATA(n) -> CRLF -> SIZE_LINE | TRAILERS -> DONE`

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::Error;
use crate::header::HeaderBag;

/// Refuses to honor a chunk-size line claiming more than this many bytes in
/// one chunk (protects against a hostile/broken peer sending an absurd size).
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 64 * 1024 * 1024;

#[derive(Debug, PartialEq, Eq)]
enum State {
    SizeLine,
    Data(u64),
    TrailingCrlf,
    Trailers,
    Done,
}

pub struct ChunkedReader {
    state: State,
    max_chunk_size: u64,
    trailers: HeaderBag,
}

impl ChunkedReader {
    pub fn new() -> Self {
        Self::with_max_chunk_size(DEFAULT_MAX_CHUNK_SIZE)
    }

    pub fn with_max_chunk_size(max_chunk_size: u64) -> Self {
        Self {
            state: State::SizeLine,
            max_chunk_size,
            trailers: HeaderBag::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    pub fn trailers(&self) -> &HeaderBag {
        &self.trailers
    }

    /// Reads and returns the next data chunk, or `Ok(None)` once the
    /// terminating `0\r\n` chunk and any trailers have been consumed.
    pub async fn next_chunk<R: AsyncBufRead + Unpin>(
        &mut self,
        reader: &mut R,
    ) -> Result<Option<Bytes>, Error> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::SizeLine => {
                    let line = read_line(reader).await?;
                    let size = parse_chunk_size(&line)?;
                    if size > self.max_chunk_size {
                        return Err(Error::Protocol(format!(
                            "chunk size {size} exceeds max_chunk_size {}",
                            self.max_chunk_size
                        )));
                    }
                    self.state = if size == 0 {
                        State::Trailers
                    } else {
                        State::Data(size)
                    };
                }
                State::Data(remaining) => {
                    let mut buf = BytesMut::zeroed(remaining as usize);
                    reader.read_exact(&mut buf).await.map_err(Error::from)?;
                    self.state = State::TrailingCrlf;
                    return Ok(Some(buf.freeze()));
                }
                State::TrailingCrlf => {
                    let line = read_line(reader).await?;
                    if !line.is_empty() {
                        return Err(Error::Protocol(
                            "expected CRLF after chunk data".to_string(),
                        ));
                    }
                    self.state = State::SizeLine;
                }
                State::Trailers => {
                    let line = read_line(reader).await?;
                    if line.is_empty() {
                        self.state = State::Done;
                        return Ok(None);
                    }
                    let (name, value) = line
                        .split_once(':')
                        .ok_or_else(|| Error::Protocol(format!("malformed trailer line '{line}'")))?;
                    self.trailers.add(name, value.trim())?;
                }
            }
        }
    }
}

impl Default for ChunkedReader {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String, Error> {
    let mut raw = Vec::new();
    let n = reader
        .read_until(b'\n', &mut raw)
        .await
        .map_err(Error::from)?;
    if n == 0 {
        return Err(Error::Protocol(
            "connection closed mid chunked body".to_string(),
        ));
    }
    while raw.last() == Some(&b'\n') || raw.last() == Some(&b'\r') {
        raw.pop();
    }
    String::from_utf8(raw).map_err(|_| Error::Protocol("chunk line is not valid UTF-8".to_string()))
}

/// Chunk-size line is `<hex-size>[;ext...]`. Extensions are accepted and
/// ignored (§4.1 does not require acting on them).
fn parse_chunk_size(line: &str) -> Result<u64, Error> {
    let size_part = line.split(';').next().unwrap_or("").trim();
    u64::from_str_radix(size_part, 16)
        .map_err(|_| Error::Protocol(format!("invalid chunk size '{size_part}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    async fn drain(raw: &[u8]) -> Result<(Vec<Bytes>, HeaderBag), Error> {
        let mut r = BufReader::new(Cursor::new(raw.to_vec()));
        let mut chunked = ChunkedReader::new();
        let mut out = Vec::new();
        while let Some(chunk) = chunked.next_chunk(&mut r).await? {
            out.push(chunk);
        }
        Ok((out, chunked.trailers().clone()))
    }

    #[tokio::test]
    async fn reads_multiple_chunks_to_completion() {
        let (chunks, _) = drain(b"5\r\nHello\r\n6\r\n World\r\n0\r\n\r\n").await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[0][..], b"Hello");
        assert_eq!(&chunks[1][..], b" World");
    }

    #[tokio::test]
    async fn captures_trailers() {
        let (_, trailers) = drain(b"0\r\nX-Checksum: abc\r\n\r\n").await.unwrap();
        assert_eq!(trailers.get("x-checksum"), Some("abc"));
    }

    #[tokio::test]
    async fn ignores_chunk_extensions() {
        let (chunks, _) = drain(b"5;foo=bar\r\nHello\r\n0\r\n\r\n").await.unwrap();
        assert_eq!(&chunks[0][..], b"Hello");
    }

    #[tokio::test]
    async fn rejects_chunk_over_max_size() {
        let mut r = BufReader::new(Cursor::new(b"ffffffff\r\n".to_vec()));
        let mut chunked = ChunkedReader::with_max_chunk_size(10);
        let result = chunked.next_chunk(&mut r).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_missing_trailing_crlf() {
        let mut r = BufReader::new(Cursor::new(b"5\r\nHelloXX0\r\n\r\n".to_vec()));
        let mut chunked = ChunkedReader::new();
        chunked.next_chunk(&mut r).await.unwrap();
        let result = chunked.next_chunk(&mut r).await;
        assert!(result.is_err());
    }
}
