use std::io::Write;
use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::Value;
use tracing::{debug, info, trace};
use url::Url;

use crate::conn::{http, CommandChannel};
use crate::descriptor;
use crate::{Error, Result};

const CAPTURE_STARTED: u8 = 10;
/// The remaining 80 points past this track received bytes.
const DOWNLOAD_STARTED: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CapturePhase {
    Idle,
    Capturing,
    AwaitingIdle,
    Downloading,
    Done,
    Failed,
}

/// One shutter press. Progress goes through the shared counter so other
/// threads can poll it while the session blocks the worker.
pub(crate) struct CaptureSession<'a> {
    channel: &'a CommandChannel,
    progress: &'a AtomicU8,
    phase: CapturePhase,
}

impl<'a> CaptureSession<'a> {
    pub(crate) fn new(channel: &'a CommandChannel, progress: &'a AtomicU8) -> Self {
        Self {
            channel,
            progress,
            phase: CapturePhase::Idle,
        }
    }

    pub(crate) fn run(mut self) -> Result<Vec<u8>> {
        match self.execute() {
            Ok(photo) => {
                self.enter(CapturePhase::Done);
                Ok(photo)
            }
            Err(e) => {
                self.enter(CapturePhase::Failed);
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<Vec<u8>> {
        let status = self.channel.get_event()?;
        if !status.mode.is_idle() {
            return Err(Error::State {
                op: "actTakePicture",
                need: "IDLE",
                got: status.mode.as_str().to_owned(),
            });
        }

        self.enter(CapturePhase::Capturing);
        let shot = self.channel.call("actTakePicture", &[])?;
        self.bump(CAPTURE_STARTED);

        let postview = shot
            .get(0)
            .and_then(|urls| urls.get(0))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidData("actTakePicture returned no postview URL".into()))?
            .to_owned();

        self.enter(CapturePhase::AwaitingIdle);
        loop {
            let status = self.channel.get_event()?;
            if status.mode.is_idle() {
                break;
            }
            trace!(mode = status.mode.as_str(), "waiting for capture to settle");
        }

        self.enter(CapturePhase::Downloading);
        self.download(&postview)
    }

    fn download(&mut self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::InvalidData(format!("bad postview URL {}: {}", url, e).into()))?;
        let (host, port) = descriptor::host_port(&parsed)?;
        let path = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_owned(),
        };

        let mut stream = http::connect(host, port, self.channel.timeout())?;
        stream.write_all(http::format_get(&path, host).as_bytes())?;

        let (head, early) = http::read_head(&mut stream)?;
        let total = http::content_length(&head);
        if total == 0 {
            return Err(Error::InvalidData(
                "postview response carries no content length".into(),
            ));
        }

        debug!(url, bytes = total, "postview download start");
        self.bump(DOWNLOAD_STARTED);
        let progress = self.progress;
        let photo = http::read_body(&mut stream, total, early, |got, want| {
            progress.fetch_max(download_progress(got, want), Ordering::Relaxed);
        })?;

        info!(bytes = photo.len(), "postview download complete");
        Ok(photo)
    }

    fn enter(&mut self, phase: CapturePhase) {
        debug!(from = ?self.phase, to = ?phase, "capture phase");
        self.phase = phase;
    }

    fn bump(&self, value: u8) {
        self.progress.fetch_max(value, Ordering::Relaxed);
    }
}

/// Truncation keeps the value under 100 until the last byte arrived.
pub(crate) fn download_progress(got: usize, total: usize) -> u8 {
    (DOWNLOAD_STARTED as f32 + 0.8 * ((got as u64 * 100 / total as u64) as f32)) as u8
}
