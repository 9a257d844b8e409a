//! Public camera handle. The handle only posts events; sockets live
//! entirely inside the worker thread.

mod capture;
mod worker;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde_json::{json, Value};
use tracing::debug;

use crate::conn::http;
use crate::discovery;
use crate::proto::{ShootMode, StillSizeOption, ZoomDirection, ZoomMovement};
use crate::{Error, Result};

/// `Default` matches the camera family's documented timings.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub service_type: String,
    pub discovery_timeout: Duration,
    pub discovery_retries: u32,
    pub io_timeout: Duration,
    pub queue_depth: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            service_type: discovery::SCALAR_WEB_API_SERVICE.to_owned(),
            discovery_timeout: Duration::from_secs(1),
            discovery_retries: 3,
            io_timeout: http::IO_TIMEOUT,
            queue_depth: 64,
        }
    }
}

/// Asynchronous camera output, delivered on the receiver handed out by
/// [`Camera::new`].
#[derive(Debug)]
pub enum Notification {
    PreviewImage(Vec<u8>),
    /// `None` means the capture or download failed.
    PhotoCaptured(Option<Vec<u8>>),
    LiveViewRunning(bool),
    /// The stream is down and was not recovered.
    LiveViewStopped(bool),
    /// Largest first.
    StillSizes(Vec<StillSizeOption>),
}

pub(crate) enum Event {
    Connect,
    DrainCommands,
    NextFrame,
    TakePhoto,
    SetShootMode(ShootMode),
    StartMovieRec,
    StopMovieRec,
}

pub struct Camera {
    event_tx: Sender<Event>,
    cmd_tx: Sender<(String, Vec<Value>)>,
    progress: Arc<AtomicU8>,
    done_tx: Option<Sender<()>>,
    join: Option<thread::JoinHandle<()>>,
}

impl Camera {
    pub fn new(config: CameraConfig) -> (Self, Receiver<Notification>) {
        let (event_tx, event_rx) = unbounded();
        let (cmd_tx, cmd_rx) = bounded(config.queue_depth);
        let (notif_tx, notif_rx) = unbounded();
        let (done_tx, done_rx) = bounded(0);
        let progress = Arc::new(AtomicU8::new(0));

        let worker_event_tx = event_tx.clone();
        let worker_progress = progress.clone();
        let join = thread::spawn(move || {
            worker::run(
                config,
                worker_event_tx,
                event_rx,
                cmd_rx,
                notif_tx,
                done_rx,
                worker_progress,
            );
        });

        (
            Self {
                event_tx,
                cmd_tx,
                progress,
                done_tx: Some(done_tx),
                join: Some(join),
            },
            notif_rx,
        )
    }

    pub fn start_camera(&self) -> Result<()> {
        self.post(Event::Connect)
    }

    /// Blocks when the queue is full; the worker executes entries in
    /// order between liveview frames.
    pub fn send_camera_command(&self, method: &str, params: &[Value]) -> Result<()> {
        self.cmd_tx
            .send((method.to_owned(), params.to_vec()))
            .map_err(|_| Error::Other("command queue closed".into()))?;
        self.post(Event::DrainCommands)
    }

    pub fn still_mode(&self) -> Result<()> {
        self.post(Event::SetShootMode(ShootMode::Still))
    }

    pub fn video_mode(&self) -> Result<()> {
        self.post(Event::SetShootMode(ShootMode::Movie))
    }

    /// The photo arrives as a [`Notification::PhotoCaptured`]; progress
    /// is readable through [`Camera::photo_progress`] meanwhile.
    pub fn take_photo(&self) -> Result<()> {
        self.post(Event::TakePhoto)
    }

    pub fn start_video(&self) -> Result<()> {
        self.post(Event::StartMovieRec)
    }

    pub fn stop_video(&self) -> Result<()> {
        self.post(Event::StopMovieRec)
    }

    /// 0 until a capture starts, 100 only once the postview download
    /// completed, never moving backwards in between.
    pub fn photo_progress(&self) -> u8 {
        self.progress.load(Ordering::Relaxed)
    }

    pub fn act_zoom(&self, direction: ZoomDirection, movement: ZoomMovement) -> Result<()> {
        self.send_camera_command(
            "actZoom",
            &[json!(direction.param()), json!(movement.param())],
        )
    }

    /// `x` and `y` are in percent of the frame.
    pub fn set_touch_af_position(&self, x: f64, y: f64) -> Result<()> {
        self.send_camera_command("setTouchAFPosition", &[json!(x), json!(y)])
    }

    pub fn set_still_size(&self, aspect: &str, size: &str) -> Result<()> {
        self.send_camera_command("setStillSize", &[json!(aspect), json!(size)])
    }

    fn post(&self, event: Event) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|_| Error::Other("camera task chan broken".into()))
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        drop(self.done_tx.take());
        if let Some(join) = self.join.take() {
            debug!("wait for camera worker to be stopped");
            let _ = join.join();
        }
    }
}
