//! Text-framed request/response plumbing. Not a general HTTP client:
//! the camera speaks plain `Content-Length` framing and nothing else.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::{Error, Result};

pub(crate) const CHUNK_SIZE: usize = 4096;

pub const IO_TIMEOUT: Duration = Duration::from_secs(8);

pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let addr = (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| Error::InvalidData(format!("unresolvable host {}", host).into()))?;
    let stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    Ok(stream)
}

pub fn format_get(path: &str, host: &str) -> String {
    format!("GET {} HTTP/1.0\r\nHost: {}\r\n\r\n", path, host)
}

pub fn format_post(path: &str, host: &str, body: &str) -> String {
    format!(
        "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Length: {}\r\n\r\n{}",
        path,
        host,
        body.len(),
        body
    )
}

/// Read up to the blank-line terminator, returning the header text and
/// any body bytes that arrived in the same reads.
pub fn read_head(r: &mut impl Read) -> Result<(String, Vec<u8>)> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut acc: Vec<u8> = Vec::new();
    loop {
        let read = r.read(&mut buf)?;
        if read == 0 {
            return Err(Error::InvalidData(
                "connection closed before response header".into(),
            ));
        }
        acc.extend_from_slice(&buf[..read]);
        if let Some(at) = find_terminator(&acc) {
            let body = acc.split_off(at + 4);
            acc.truncate(at);
            let head = String::from_utf8_lossy(&acc).into_owned();
            return Ok((head, body));
        }
    }
}

fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

pub fn content_length(head: &str) -> usize {
    for line in head.lines() {
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            return value.trim().parse().unwrap_or(0);
        }
    }
    0
}

/// Read until `body` holds exactly `total` bytes, reporting
/// `(got, total)` after every read. A short read discards everything.
pub fn read_body(
    r: &mut impl Read,
    total: usize,
    mut body: Vec<u8>,
    mut on_chunk: impl FnMut(usize, usize),
) -> Result<Vec<u8>> {
    body.truncate(total);
    on_chunk(body.len(), total);
    let mut buf = [0u8; CHUNK_SIZE];
    while body.len() < total {
        let want = (total - body.len()).min(CHUNK_SIZE);
        let read = r.read(&mut buf[..want])?;
        if read == 0 {
            return Err(Error::IncompleteTransfer {
                want: total,
                got: body.len(),
            });
        }
        body.extend_from_slice(&buf[..read]);
        on_chunk(body.len(), total);
    }
    Ok(body)
}

/// Yields leftover bytes from a header read before falling through to
/// the underlying stream.
pub(crate) struct Prefixed<R> {
    prefix: Vec<u8>,
    at: usize,
    inner: R,
}

impl<R> Prefixed<R> {
    pub(crate) fn new(prefix: Vec<u8>, inner: R) -> Self {
        Self {
            prefix,
            at: 0,
            inner,
        }
    }
}

impl<R: Read> Read for Prefixed<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.at < self.prefix.len() {
            let take = (self.prefix.len() - self.at).min(buf.len());
            buf[..take].copy_from_slice(&self.prefix[self.at..self.at + take]);
            self.at += take;
            return Ok(take);
        }
        self.inner.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn head_splits_off_body_prefix() {
        let raw = b"HTTP/1.0 200 OK\r\nContent-Length: 5\r\n\r\nhel".to_vec();
        let (head, body) = read_head(&mut Cursor::new(raw)).unwrap();
        assert!(head.starts_with("HTTP/1.0 200 OK"));
        assert_eq!(content_length(&head), 5);
        assert_eq!(body, b"hel");
    }

    #[test]
    fn head_without_terminator_is_invalid() {
        let raw = b"HTTP/1.0 200 OK\r\n".to_vec();
        assert!(matches!(
            read_head(&mut Cursor::new(raw)),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn content_length_is_case_insensitive() {
        assert_eq!(content_length("Foo: 1\r\nCONTENT-LENGTH: 42\r\n"), 42);
        assert_eq!(content_length("content-length:7"), 7);
    }

    #[test]
    fn content_length_defaults_to_zero() {
        assert_eq!(content_length("HTTP/1.0 200 OK\r\nServer: x\r\n"), 0);
    }

    #[test]
    fn body_counts_prefix_and_reads_the_rest() {
        let mut seen = Vec::new();
        let body = read_body(
            &mut Cursor::new(b"lo".to_vec()),
            5,
            b"hel".to_vec(),
            |got, total| seen.push((got, total)),
        )
        .unwrap();
        assert_eq!(body, b"hello");
        assert_eq!(seen, vec![(3, 5), (5, 5)]);
    }

    #[test]
    fn early_close_discards_the_body() {
        let res = read_body(&mut Cursor::new(b"ab".to_vec()), 5, Vec::new(), |_, _| {});
        assert!(matches!(
            res,
            Err(Error::IncompleteTransfer { want: 5, got: 2 })
        ));
    }

    #[test]
    fn prefixed_reader_drains_prefix_first() {
        let mut r = Prefixed::new(b"ab".to_vec(), Cursor::new(b"cd".to_vec()));
        let mut out = [0u8; 4];
        r.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"abcd");
    }
}
