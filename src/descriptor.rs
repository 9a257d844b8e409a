use std::fmt;
use std::io::Write;
use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::conn::http;
use crate::discovery::DeviceDescriptor;
use crate::util::xml;
use crate::{Error, Result};

const SERVICE_ELEMENT: &str = "X_ScalarWebAPI_Service";
const SERVICE_TYPE_ELEMENT: &str = "X_ScalarWebAPI_ServiceType";
const ACTION_LIST_ELEMENT: &str = "X_ScalarWebAPI_ActionList_URL";

/// Service name of the remote-control API, doubling as the path segment
/// appended to the advertised action list URL.
const CAMERA_SERVICE: &str = "camera";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraEndpoint {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl fmt::Display for CameraEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http://{}:{}{}", self.host, self.port, self.path)
    }
}

pub fn resolve_endpoint(found: &DeviceDescriptor, timeout: Duration) -> Result<CameraEndpoint> {
    let document = fetch_descriptor(&found.location, timeout)?;
    let action_url = endpoint_from_xml(&document)?;
    let endpoint = endpoint_from_url(&action_url)?;
    info!(endpoint = %endpoint, "camera endpoint resolved");
    Ok(endpoint)
}

fn fetch_descriptor(location: &str, timeout: Duration) -> Result<String> {
    let url = Url::parse(location)
        .map_err(|e| Error::Descriptor(format!("bad descriptor URL {}: {}", location, e).into()))?;
    let (host, port) = host_port(&url)?;

    let mut stream = http::connect(host, port, timeout)?;
    let path = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_owned(),
    };
    stream.write_all(http::format_get(&path, host).as_bytes())?;

    let (head, early) = http::read_head(&mut stream)?;
    let total = http::content_length(&head);
    let body = http::read_body(&mut stream, total, early, |_, _| {})?;
    debug!(bytes = body.len(), "device descriptor fetched");
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// First service entry advertising the camera service wins.
fn endpoint_from_xml(document: &str) -> Result<String> {
    let mut at = 0;
    while let Some((service, next)) = xml::next_element(document, SERVICE_ELEMENT, at) {
        at = next;
        let kind = xml::element_text(service, SERVICE_TYPE_ELEMENT).map(str::trim);
        if kind != Some(CAMERA_SERVICE) {
            continue;
        }
        let action_url = xml::element_text(service, ACTION_LIST_ELEMENT)
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                Error::Descriptor("camera service entry carries no action list URL".into())
            })?;
        return Ok(format!(
            "{}/{}",
            action_url.trim_end_matches('/'),
            CAMERA_SERVICE
        ));
    }
    Err(Error::Descriptor("descriptor lists no camera service".into()))
}

fn endpoint_from_url(raw: &str) -> Result<CameraEndpoint> {
    let url = Url::parse(raw)
        .map_err(|e| Error::Descriptor(format!("bad endpoint URL {}: {}", raw, e).into()))?;
    let (host, port) = host_port(&url)?;
    Ok(CameraEndpoint {
        host: host.to_owned(),
        port,
        path: url.path().to_owned(),
    })
}

/// The cameras always advertise an explicit port; one is required here.
pub(crate) fn host_port(url: &Url) -> Result<(&str, u16)> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::Descriptor(format!("URL {} carries no host", url).into()))?;
    let port = url
        .port()
        .ok_or_else(|| Error::Descriptor(format!("URL {} carries no explicit port", url).into()))?;
    Ok((host, port))
}
