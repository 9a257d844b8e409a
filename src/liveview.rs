//! Binary-framed liveview stream: an 8 byte common header, a 128 byte
//! payload header carrying a 3 byte big-endian JPEG length, the JPEG.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use tracing::debug;
use url::Url;

use crate::conn::http::{self, Prefixed};
use crate::descriptor;
use crate::{Error, Result};

pub const COMMON_HEADER_SIZE: usize = 8;
pub const PAYLOAD_HEADER_SIZE: usize = 128;

const COMMON_HEADER_MAGIC: [u8; 2] = [0xff, 0x01];
const PAYLOAD_HEADER_MAGIC: [u8; 4] = [0x24, 0x35, 0x68, 0x79];
const PAYLOAD_SIZE_INDEX: usize = 4;

pub fn payload_size(common: &[u8], payload: &[u8]) -> Result<usize> {
    if common[..2] != COMMON_HEADER_MAGIC {
        return Err(Error::FrameCorrupted("common header magic mismatch".into()));
    }
    if payload[..4] != PAYLOAD_HEADER_MAGIC {
        return Err(Error::FrameCorrupted(
            "payload header magic mismatch".into(),
        ));
    }
    let size = BigEndian::read_u24(&payload[PAYLOAD_SIZE_INDEX..PAYLOAD_SIZE_INDEX + 3]) as usize;
    if size == 0 {
        return Err(Error::FrameCorrupted("zero length frame".into()));
    }
    Ok(size)
}

pub struct LiveViewStream {
    reader: Prefixed<TcpStream>,
}

impl LiveViewStream {
    /// Frame bytes that arrive in the same packet as the response header
    /// are kept, not dropped.
    pub fn open(url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::InvalidData(format!("bad liveview URL {}: {}", url, e).into()))?;
        let (host, port) = descriptor::host_port(&parsed)?;
        let path = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_owned(),
        };

        let mut stream = http::connect(host, port, timeout)?;
        stream.write_all(http::format_get(&path, host).as_bytes())?;
        let (_head, early) = http::read_head(&mut stream)?;
        debug!(url, "liveview stream open");
        Ok(Self {
            reader: Prefixed::new(early, stream),
        })
    }

    /// Any error leaves the stream unusable; the caller reopens.
    pub fn next_frame(&mut self) -> Result<Vec<u8>> {
        let mut common = [0u8; COMMON_HEADER_SIZE];
        self.reader.read_exact(&mut common)?;
        let mut payload = [0u8; PAYLOAD_HEADER_SIZE];
        self.reader.read_exact(&mut payload)?;

        let size = payload_size(&common, &payload)?;
        http::read_body(&mut self.reader, size, Vec::new(), |_, _| {})
    }
}

#[cfg(test)]
pub(crate) fn frame_bytes(data: &[u8]) -> Vec<u8> {
    let mut common = [0u8; COMMON_HEADER_SIZE];
    common[..2].copy_from_slice(&COMMON_HEADER_MAGIC);
    let mut payload = [0u8; PAYLOAD_HEADER_SIZE];
    payload[..4].copy_from_slice(&PAYLOAD_HEADER_MAGIC);
    payload[PAYLOAD_SIZE_INDEX] = (data.len() >> 16) as u8;
    payload[PAYLOAD_SIZE_INDEX + 1] = (data.len() >> 8) as u8;
    payload[PAYLOAD_SIZE_INDEX + 2] = data.len() as u8;

    let mut out = Vec::new();
    out.extend_from_slice(&common);
    out.extend_from_slice(&payload);
    out.extend_from_slice(data);
    out
}
