use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

/// Fixed request id. Every exchange runs on its own connection, so there
/// is nothing to correlate.
pub const PROTOCOL_ID: u32 = 1;
pub const PROTOCOL_VERSION: &str = "1.0";

#[derive(Debug, Serialize)]
pub struct CameraCommand {
    pub method: String,
    pub params: Vec<Value>,
    pub id: u32,
    pub version: &'static str,
}

impl CameraCommand {
    pub fn new(method: &str, params: &[Value]) -> Self {
        Self {
            method: method.to_owned(),
            params: params.to_vec(),
            id: PROTOCOL_ID,
            version: PROTOCOL_VERSION,
        }
    }
}

/// An `error` member wins over everything else; `result`/`results` are
/// unwrapped; anything else passes through verbatim.
pub fn classify_response(mut response: Value) -> Result<Value> {
    if let Some(err) = response.get("error") {
        let code = err.get(0).and_then(Value::as_i64).unwrap_or(0);
        let message = err
            .get(1)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        return Err(Error::Device { code, message });
    }
    for key in ["result", "results"] {
        if let Some(payload) = response.get_mut(key) {
            return Ok(payload.take());
        }
    }
    Ok(response)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatingMode {
    Idle,
    MovieRecording,
    Other(String),
}

impl OperatingMode {
    fn parse(raw: &str) -> Self {
        match raw {
            "IDLE" => OperatingMode::Idle,
            "MovieRecording" => OperatingMode::MovieRecording,
            other => OperatingMode::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            OperatingMode::Idle => "IDLE",
            OperatingMode::MovieRecording => "MovieRecording",
            OperatingMode::Other(raw) => raw,
        }
    }

    pub fn is_idle(&self) -> bool {
        *self == OperatingMode::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShootMode {
    Still,
    Movie,
}

impl ShootMode {
    pub fn param(self) -> &'static str {
        match self {
            ShootMode::Still => "still",
            ShootMode::Movie => "movie",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "still" => Some(ShootMode::Still),
            "movie" => Some(ShootMode::Movie),
            _ => None,
        }
    }
}

/// The pieces of a `getEvent` snapshot the client gates commands on.
#[derive(Debug, Clone)]
pub struct CameraStatus {
    pub mode: OperatingMode,
    pub shoot_mode: Option<ShootMode>,
}

impl CameraStatus {
    /// Entries are matched by key rather than index; firmware variations
    /// in the event array layout do not matter.
    pub fn from_event(event: &Value) -> Result<Self> {
        let entries = event
            .as_array()
            .ok_or_else(|| Error::InvalidData("getEvent payload is not an array".into()))?;
        let mut mode = None;
        let mut shoot_mode = None;
        for entry in entries {
            if let Some(raw) = entry.get("cameraStatus").and_then(Value::as_str) {
                mode = Some(OperatingMode::parse(raw));
            }
            if let Some(raw) = entry.get("currentShootMode").and_then(Value::as_str) {
                shoot_mode = ShootMode::parse(raw);
            }
        }
        let mode = mode.ok_or_else(|| {
            Error::InvalidData("getEvent payload carries no cameraStatus".into())
        })?;
        Ok(Self { mode, shoot_mode })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillSizeOption {
    pub aspect: String,
    pub size: String,
}

pub fn parse_still_sizes(payload: &Value) -> Vec<StillSizeOption> {
    let mut out = Vec::new();
    if let Some(entries) = payload.get(0).and_then(Value::as_array) {
        for entry in entries {
            let aspect = entry.get("aspect").and_then(Value::as_str);
            let size = entry.get("size").and_then(Value::as_str);
            if let (Some(aspect), Some(size)) = (aspect, size) {
                out.push(StillSizeOption {
                    aspect: aspect.to_owned(),
                    size: size.to_owned(),
                });
            }
        }
    }
    out
}

/// Largest first; `size` is a megapixel label like `"20M"` or `"7.5M"`,
/// and ties keep their reported order.
pub fn sort_still_sizes(sizes: &mut [StillSizeOption]) {
    sizes.sort_by(|a, b| {
        numeric_size(&b.size)
            .partial_cmp(&numeric_size(&a.size))
            .unwrap_or(Ordering::Equal)
    });
}

fn numeric_size(size: &str) -> f64 {
    size.trim_end_matches(|c: char| !c.is_ascii_digit() && c != '.')
        .parse()
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

impl ZoomDirection {
    pub fn param(self) -> &'static str {
        match self {
            ZoomDirection::In => "in",
            ZoomDirection::Out => "out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomMovement {
    Start,
    Stop,
}

impl ZoomMovement {
    pub fn param(self) -> &'static str {
        match self {
            ZoomMovement::Start => "start",
            ZoomMovement::Stop => "stop",
        }
    }
}
