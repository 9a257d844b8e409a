//! The camera worker thread owns every socket and executes events one
//! at a time.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crossbeam_channel::{select, Receiver, Sender};
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use super::capture::CaptureSession;
use super::{CameraConfig, Event, Notification};
use crate::conn::CommandChannel;
use crate::liveview::LiveViewStream;
use crate::proto::{self, OperatingMode, ShootMode};
use crate::{descriptor, discovery, Error, Result};

pub(crate) fn run(
    config: CameraConfig,
    event_tx: Sender<Event>,
    event_rx: Receiver<Event>,
    cmd_rx: Receiver<(String, Vec<Value>)>,
    notif_tx: Sender<Notification>,
    done: Receiver<()>,
    progress: Arc<AtomicU8>,
) {
    debug!("camera worker start");
    let mut worker = CameraWorker {
        config,
        channel: None,
        liveview: None,
        event_tx,
        notif_tx,
        cmd_rx,
        progress,
    };
    if let Err(e) = worker.run_loop(event_rx, done) {
        warn!("camera worker broke: {:?}", e);
    }
    debug!("camera worker stop");
}

struct CameraWorker {
    config: CameraConfig,
    channel: Option<CommandChannel>,
    liveview: Option<LiveViewStream>,
    event_tx: Sender<Event>,
    notif_tx: Sender<Notification>,
    cmd_rx: Receiver<(String, Vec<Value>)>,
    progress: Arc<AtomicU8>,
}

impl CameraWorker {
    fn run_loop(&mut self, event_rx: Receiver<Event>, done: Receiver<()>) -> Result<()> {
        loop {
            select! {
                recv(done) -> _ => {
                    return Ok(());
                }

                recv(event_rx) -> event_res => {
                    let event = event_res.map_err(|_| Error::Other("event chan broken".into()))?;
                    self.handle(event);
                }
            }
        }
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Connect => self.connect(),
            Event::DrainCommands => self.drain_commands(),
            Event::NextFrame => self.pump_liveview(),
            Event::TakePhoto => self.take_photo(),
            Event::SetShootMode(mode) => {
                if let Err(e) = self.set_shoot_mode(mode) {
                    warn!(mode = mode.param(), "set shoot mode failed: {:?}", e);
                }
            }
            Event::StartMovieRec => {
                if let Err(e) = self.start_movie_rec() {
                    warn!("start movie recording failed: {:?}", e);
                }
            }
            Event::StopMovieRec => {
                if let Err(e) = self.stop_movie_rec() {
                    warn!("stop movie recording failed: {:?}", e);
                }
            }
        }
    }

    /// Stale sockets are dropped up front so a repeated connect starts
    /// clean.
    fn connect(&mut self) {
        self.liveview = None;
        self.channel = None;
        if let Err(e) = self.try_connect() {
            warn!("camera connect failed: {:?}", e);
        }
    }

    fn try_connect(&mut self) -> Result<()> {
        let found = discovery::discover(
            &self.config.service_type,
            self.config.discovery_timeout,
            self.config.discovery_retries,
        )?;
        let endpoint = descriptor::resolve_endpoint(&found, self.config.io_timeout)?;
        let channel = CommandChannel::new(endpoint, self.config.io_timeout);
        self.query_capabilities(&channel);

        self.channel = Some(channel);
        if self.start_live_view() {
            self.post(Event::NextFrame);
        }
        Ok(())
    }

    fn query_capabilities(&mut self, channel: &CommandChannel) {
        match channel.call("getAvailableApiList", &[]) {
            Ok(apis) => {
                let count = apis.get(0).and_then(Value::as_array).map_or(0, Vec::len);
                debug!(count, "available APIs");
            }
            Err(e) => debug!("getAvailableApiList failed: {:?}", e),
        }

        match channel.call("getSupportedStillSize", &[]) {
            Ok(payload) => {
                let mut sizes = proto::parse_still_sizes(&payload);
                proto::sort_still_sizes(&mut sizes);
                if sizes.is_empty() {
                    debug!("no still sizes reported");
                } else {
                    self.notify(Notification::StillSizes(sizes));
                }
            }
            Err(e) => debug!("getSupportedStillSize failed: {:?}", e),
        }
    }

    /// Any previous stream is dropped first so a failure cannot leave a
    /// stale socket behind.
    fn start_live_view(&mut self) -> bool {
        self.liveview = None;
        match self.try_start_live_view() {
            Ok(stream) => {
                self.liveview = Some(stream);
                self.notify(Notification::LiveViewRunning(true));
                true
            }
            Err(e) => {
                warn!("liveview start failed: {:?}", e);
                self.notify(Notification::LiveViewStopped(true));
                false
            }
        }
    }

    fn try_start_live_view(&mut self) -> Result<LiveViewStream> {
        let channel = self.channel()?;
        let payload = channel.call("startLiveview", &[])?;
        let url = payload
            .get(0)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidData("startLiveview returned no URL".into()))?;
        info!(url, "liveview URL");
        LiveViewStream::open(url, self.config.io_timeout)
    }

    /// A broken stream is rebuilt through `startLiveview`; pumping only
    /// stops once that fails too.
    fn pump_liveview(&mut self) {
        let frame = match self.liveview.as_mut() {
            Some(stream) => stream.next_frame(),
            None => return,
        };

        match frame {
            Ok(data) => {
                trace!(bytes = data.len(), "liveview frame");
                self.notify(Notification::PreviewImage(data));
            }
            Err(e) => {
                debug!("liveview stream broke, restarting: {:?}", e);
                self.start_live_view();
            }
        }

        if self.liveview.is_some() {
            self.post(Event::NextFrame);
        }
    }

    fn drain_commands(&mut self) {
        while let Ok((method, params)) = self.cmd_rx.try_recv() {
            match self.channel.as_ref() {
                Some(channel) => {
                    if let Err(e) = channel.call(&method, &params) {
                        warn!(method = %method, "queued command failed: {:?}", e);
                    }
                }
                None => warn!(method = %method, "camera not connected, command dropped"),
            }
        }
    }

    fn take_photo(&mut self) {
        self.progress.store(0, Ordering::Relaxed);
        let photo = match self.channel.as_ref() {
            Some(channel) => CaptureSession::new(channel, &self.progress).run(),
            None => Err(Error::Other("camera endpoint not resolved".into())),
        };

        match photo {
            Ok(data) => {
                info!(bytes = data.len(), "photo captured");
                self.notify(Notification::PhotoCaptured(Some(data)));
            }
            Err(e) => {
                error!("photo capture failed: {:?}", e);
                self.notify(Notification::PhotoCaptured(None));
            }
        }
    }

    fn set_shoot_mode(&mut self, mode: ShootMode) -> Result<()> {
        let channel = self.channel()?;
        let status = channel.get_event()?;
        if !status.mode.is_idle() {
            return Err(Error::State {
                op: "setShootMode",
                need: "IDLE",
                got: status.mode.as_str().to_owned(),
            });
        }
        let payload = channel.call("setShootMode", &[Value::from(mode.param())])?;
        check_zero_result("setShootMode", &payload)?;
        info!(mode = mode.param(), "shoot mode set");
        Ok(())
    }

    fn start_movie_rec(&mut self) -> Result<()> {
        let channel = self.channel()?;
        let status = channel.get_event()?;
        if !status.mode.is_idle() {
            return Err(Error::State {
                op: "startMovieRec",
                need: "IDLE",
                got: status.mode.as_str().to_owned(),
            });
        }
        if status.shoot_mode != Some(ShootMode::Movie) {
            return Err(Error::State {
                op: "startMovieRec",
                need: "movie shoot mode",
                got: status
                    .shoot_mode
                    .map(|m| m.param().to_owned())
                    .unwrap_or_else(|| "unknown".to_owned()),
            });
        }
        let payload = channel.call("startMovieRec", &[])?;
        check_zero_result("startMovieRec", &payload)?;
        info!("movie recording started");
        Ok(())
    }

    fn stop_movie_rec(&mut self) -> Result<()> {
        let channel = self.channel()?;
        let status = channel.get_event()?;
        if status.mode != OperatingMode::MovieRecording {
            return Err(Error::State {
                op: "stopMovieRec",
                need: "MovieRecording",
                got: status.mode.as_str().to_owned(),
            });
        }
        channel.call("stopMovieRec", &[])?;
        info!("movie recording stopped");
        Ok(())
    }

    fn channel(&self) -> Result<&CommandChannel> {
        self.channel
            .as_ref()
            .ok_or_else(|| Error::Other("camera endpoint not resolved".into()))
    }

    fn notify(&self, notification: Notification) {
        if self.notif_tx.send(notification).is_err() {
            warn!("notification chan broken");
        }
    }

    fn post(&self, event: Event) {
        if self.event_tx.send(event).is_err() {
            warn!("event chan broken");
        }
    }
}

fn check_zero_result(method: &str, payload: &Value) -> Result<()> {
    match payload.get(0).and_then(Value::as_i64) {
        Some(0) => Ok(()),
        other => Err(Error::InvalidData(
            format!("{} reported unexpected result: {:?}", method, other).into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use std::time::Duration;

    use crossbeam_channel::{bounded, unbounded};
    use serde_json::json;

    use super::*;
    use crate::descriptor::CameraEndpoint;
    use crate::liveview;
    use crate::test_utils;

    fn test_worker(
        endpoint: Option<CameraEndpoint>,
    ) -> (
        CameraWorker,
        Sender<(String, Vec<Value>)>,
        Receiver<Event>,
        Receiver<Notification>,
    ) {
        let (event_tx, event_rx) = unbounded();
        let (notif_tx, notif_rx) = unbounded();
        let (cmd_tx, cmd_rx) = bounded(8);
        let worker = CameraWorker {
            config: CameraConfig::default(),
            channel: endpoint.map(|e| CommandChannel::new(e, Duration::from_secs(2))),
            liveview: None,
            event_tx,
            notif_tx,
            cmd_rx,
            progress: Arc::new(AtomicU8::new(0)),
        };
        (worker, cmd_tx, event_rx, notif_rx)
    }

    fn kind(notification: &Notification) -> &'static str {
        match notification {
            Notification::PreviewImage(_) => "frame",
            Notification::PhotoCaptured(Some(_)) => "photo",
            Notification::PhotoCaptured(None) => "no photo",
            Notification::LiveViewRunning(_) => "running",
            Notification::LiveViewStopped(_) => "stopped",
            Notification::StillSizes(_) => "sizes",
        }
    }

    /// Serves one frame per connection and hangs up, so every pump past
    /// the first frame sees a broken stream.
    fn one_frame_server() -> u16 {
        test_utils::spawn_server(|mut stream| {
            let _ = test_utils::read_request_line(&mut stream);
            let mut out = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
            out.extend_from_slice(&liveview::frame_bytes(b"frame"));
            let _ = stream.write_all(&out);
        })
    }

    #[test]
    fn broken_stream_reconnects_and_keeps_pumping() {
        let live_port = one_frame_server();
        let endpoint = test_utils::spawn_camera(move |request| {
            match test_utils::method_of(request).as_str() {
                "startLiveview" => json!({
                    "result": [format!("http://127.0.0.1:{}/liveview", live_port)],
                    "id": 1,
                }),
                other => json!({ "error": [12, format!("unexpected {}", other)], "id": 1 }),
            }
        });

        let (mut worker, _cmd_tx, event_rx, notif_rx) = test_worker(Some(endpoint));
        assert!(worker.start_live_view());

        worker.pump_liveview();
        // the server hung up after one frame: this pump reconnects
        worker.pump_liveview();

        let seen: Vec<_> = notif_rx.try_iter().map(|n| kind(&n)).collect();
        assert_eq!(seen, ["running", "frame", "running"]);
        assert_eq!(event_rx.try_iter().count(), 2);
        assert!(worker.liveview.is_some());
    }

    #[test]
    fn failed_reconnect_stops_the_pump() {
        let live_port = one_frame_server();
        let served = AtomicBool::new(false);
        let endpoint = test_utils::spawn_camera(move |request| {
            let first = !served.swap(true, Ordering::Relaxed);
            match test_utils::method_of(request).as_str() {
                "startLiveview" if first => json!({
                    "result": [format!("http://127.0.0.1:{}/liveview", live_port)],
                    "id": 1,
                }),
                _ => json!({ "error": [1, "Not Available Now"], "id": 1 }),
            }
        });

        let (mut worker, _cmd_tx, event_rx, notif_rx) = test_worker(Some(endpoint));
        assert!(worker.start_live_view());

        worker.pump_liveview();
        worker.pump_liveview();

        let seen: Vec<_> = notif_rx.try_iter().map(|n| kind(&n)).collect();
        assert_eq!(seen, ["running", "frame", "stopped"]);
        // only the first pump rescheduled itself
        assert_eq!(event_rx.try_iter().count(), 1);
        assert!(worker.liveview.is_none());
    }

    #[test]
    fn queued_commands_drain_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let log = calls.clone();
        let endpoint = test_utils::spawn_camera(move |request| {
            log.lock().unwrap().push(test_utils::method_of(request));
            json!({ "result": [0], "id": 1 })
        });

        let (mut worker, cmd_tx, _event_rx, _notif_rx) = test_worker(Some(endpoint));
        cmd_tx
            .send(("setShootMode".to_owned(), vec![json!("still")]))
            .unwrap();
        cmd_tx
            .send(("actZoom".to_owned(), vec![json!("in"), json!("start")]))
            .unwrap();
        worker.drain_commands();

        assert_eq!(*calls.lock().unwrap(), ["setShootMode", "actZoom"]);
    }

    #[test]
    fn commands_without_endpoint_are_dropped() {
        let (mut worker, cmd_tx, _event_rx, _notif_rx) = test_worker(None);
        cmd_tx.send(("getEvent".to_owned(), vec![])).unwrap();
        worker.drain_commands();
        assert!(worker.cmd_rx.is_empty());
    }

    #[test]
    fn capability_queries_surface_sorted_still_sizes() {
        let endpoint = test_utils::spawn_camera(|request| {
            match test_utils::method_of(request).as_str() {
                "getAvailableApiList" => {
                    json!({ "result": [["getEvent", "actTakePicture"]], "id": 1 })
                }
                "getSupportedStillSize" => json!({
                    "result": [[
                        { "aspect": "4:3", "size": "3M" },
                        { "aspect": "3:2", "size": "20M" },
                    ]],
                    "id": 1,
                }),
                other => json!({ "error": [12, format!("unexpected {}", other)], "id": 1 }),
            }
        });

        let (mut worker, _cmd_tx, _event_rx, notif_rx) = test_worker(None);
        let channel = CommandChannel::new(endpoint, Duration::from_secs(2));
        worker.query_capabilities(&channel);

        match notif_rx.try_recv() {
            Ok(Notification::StillSizes(sizes)) => {
                assert_eq!(sizes[0].size, "20M");
                assert_eq!(sizes[1].size, "3M");
            }
            other => panic!("expected still sizes, got {:?}", other),
        }
    }

    /// Serves one frame per connection, then holds the socket open until
    /// the client hangs up. With the serial accept loop this wedges any
    /// later connection for as long as an earlier stream is kept alive.
    fn eof_gated_liveview_server() -> u16 {
        test_utils::spawn_server(|mut stream| {
            let _ = test_utils::read_request_line(&mut stream);
            let mut out = b"HTTP/1.1 200 OK\r\n\r\n".to_vec();
            out.extend_from_slice(&liveview::frame_bytes(b"frame"));
            let _ = stream.write_all(&out);
            let mut sink = [0u8; 64];
            while matches!(stream.read(&mut sink), Ok(n) if n > 0) {}
        })
    }

    #[test]
    fn restarting_liveview_closes_the_previous_stream() {
        let live_port = eof_gated_liveview_server();
        let endpoint = test_utils::spawn_camera(move |request| {
            match test_utils::method_of(request).as_str() {
                "startLiveview" => json!({
                    "result": [format!("http://127.0.0.1:{}/liveview", live_port)],
                    "id": 1,
                }),
                other => json!({ "error": [12, format!("unexpected {}", other)], "id": 1 }),
            }
        });

        let (mut worker, _cmd_tx, _event_rx, notif_rx) = test_worker(Some(endpoint));
        worker.config.io_timeout = Duration::from_secs(2);

        assert!(worker.start_live_view());
        // a leaked first socket would wedge this second open past the
        // timeout; dropping it lets the server accept again
        assert!(worker.start_live_view());
        worker.pump_liveview();

        let seen: Vec<_> = notif_rx.try_iter().map(|n| kind(&n)).collect();
        assert_eq!(seen, ["running", "running", "frame"]);
    }
}
