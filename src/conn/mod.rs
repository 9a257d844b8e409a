//! JSON command channel: one fresh TCP connection per call, the way the
//! cameras expect.

pub mod http;

use std::io::Write;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::descriptor::CameraEndpoint;
use crate::proto::{self, CameraCommand, CameraStatus};
use crate::{Error, Result};

pub struct CommandChannel {
    endpoint: CameraEndpoint,
    timeout: Duration,
}

impl CommandChannel {
    pub fn new(endpoint: CameraEndpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        let body = serde_json::to_string(&CameraCommand::new(method, params))?;
        debug!(method, "camera call");

        let mut stream = http::connect(&self.endpoint.host, self.endpoint.port, self.timeout)?;
        stream.write_all(
            http::format_post(&self.endpoint.path, &self.endpoint.host, &body).as_bytes(),
        )?;

        let (head, early) = http::read_head(&mut stream)?;
        let total = http::content_length(&head);
        let raw = http::read_body(&mut stream, total, early, |_, _| {})?;
        let response: Value = serde_json::from_slice(&raw)?;

        proto::classify_response(response).map_err(|e| {
            if let Error::Device { code, message } = &e {
                warn!(
                    method,
                    params = ?params,
                    code = *code,
                    message = %message,
                    "camera rejected command"
                );
            }
            e
        })
    }

    /// One-shot `getEvent` poll, no long polling.
    pub fn get_event(&self) -> Result<CameraStatus> {
        let payload = self.call("getEvent", &[Value::Bool(false)])?;
        CameraStatus::from_event(&payload)
    }
}
