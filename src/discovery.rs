//! SSDP discovery. A fresh multicast socket is built per attempt so a
//! camera joining the network between retries is still caught.

use std::io::ErrorKind;
use std::net::Ipv4Addr;
use std::time::Duration;

use net2::UdpBuilder;
use tracing::{debug, info, warn};

use crate::{Error, Result};

pub const SSDP_ADDR: &str = "239.255.255.250";
pub const SSDP_PORT: u16 = 1900;

pub const SCALAR_WEB_API_SERVICE: &str = "urn:schemas-sony-com:service:ScalarWebAPI:1";

/// Headers of interest from a search response. Only `location` is
/// required; the rest are informational.
#[derive(Debug, Default, Clone)]
pub struct DeviceDescriptor {
    pub location: String,
    pub server: Option<String>,
    pub service_type: Option<String>,
    pub unique_service_name: Option<String>,
    pub cache_control: Option<String>,
}

pub fn discover(service: &str, timeout: Duration, retries: u32) -> Result<DeviceDescriptor> {
    let message = format!(
        "M-SEARCH * HTTP/1.1\r\nHOST: {}:{}\r\nMAN: \"ssdp:discover\"\r\nMX: 1\r\nST: {}\r\n\r\n",
        SSDP_ADDR, SSDP_PORT, service
    );

    for attempt in 1..=retries {
        debug!(attempt, retries, "ssdp search");
        match search_once(&message, timeout) {
            Ok(Some(found)) => {
                info!(location = %found.location, "device discovered");
                return Ok(found);
            }
            Ok(None) => {}
            Err(e) => warn!("ssdp search failed: {:?}", e),
        }
    }

    Err(Error::Discovery { retries })
}

fn search_once(message: &str, timeout: Duration) -> Result<Option<DeviceDescriptor>> {
    let socket = {
        let builder = UdpBuilder::new_v4()?;
        builder.reuse_address(true)?;
        builder.bind((Ipv4Addr::UNSPECIFIED, 0))?
    };
    socket.set_multicast_ttl_v4(2)?;
    socket.set_read_timeout(Some(timeout))?;
    socket.send_to(message.as_bytes(), (SSDP_ADDR, SSDP_PORT))?;

    let mut buf = [0u8; 1024];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((read, peer)) => {
                let raw = String::from_utf8_lossy(&buf[..read]);
                if let Some(found) = parse_response(&raw) {
                    debug!(%peer, "ssdp response accepted");
                    return Ok(Some(found));
                }
                debug!(%peer, "ssdp response without location, ignored");
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }
    }
}

pub(crate) fn parse_response(raw: &str) -> Option<DeviceDescriptor> {
    let mut location = None;
    let mut found = DeviceDescriptor::default();
    for line in raw.lines() {
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            match name.to_ascii_lowercase().as_str() {
                "location" => location = Some(value.to_owned()),
                "server" => found.server = Some(value.to_owned()),
                "st" => found.service_type = Some(value.to_owned()),
                "usn" => found.unique_service_name = Some(value.to_owned()),
                "cache-control" => found.cache_control = Some(value.to_owned()),
                _ => {}
            }
        }
    }
    found.location = location?;
    Some(found)
}
