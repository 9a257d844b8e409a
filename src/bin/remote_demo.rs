use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use scalarweb_rs::camera::{Camera, CameraConfig, Notification};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let (camera, notifications) = Camera::new(CameraConfig::default());
    camera.start_camera().expect("post connect");

    let started = Instant::now();
    let mut frames: u64 = 0;
    let mut capture_requested = false;
    let mut last_progress = 0;

    loop {
        match notifications.recv_timeout(Duration::from_millis(200)) {
            Ok(Notification::StillSizes(sizes)) => {
                info!("supported still sizes: {:?}", sizes);
            }

            Ok(Notification::LiveViewRunning(_)) => {
                info!("liveview stream up");
            }

            Ok(Notification::LiveViewStopped(_)) => {
                warn!("liveview stream down");
                break;
            }

            Ok(Notification::PreviewImage(frame)) => {
                frames += 1;
                if frames % 30 == 0 {
                    info!(frames, bytes = frame.len(), "liveview running");
                }

                // one capture once the stream has settled
                if !capture_requested && frames >= 30 {
                    capture_requested = true;
                    info!("taking photo");
                    camera.take_photo().expect("post take photo");
                }
            }

            Ok(Notification::PhotoCaptured(Some(photo))) => {
                info!(bytes = photo.len(), "photo downloaded");
                break;
            }

            Ok(Notification::PhotoCaptured(None)) => {
                warn!("photo capture failed");
                break;
            }

            Err(RecvTimeoutError::Timeout) => {
                if capture_requested {
                    let progress = camera.photo_progress();
                    if progress != last_progress {
                        info!(progress, "capture progress");
                        last_progress = progress;
                    }
                }

                if started.elapsed() > Duration::from_secs(120) {
                    warn!("demo timed out");
                    break;
                }
            }

            Err(RecvTimeoutError::Disconnected) => {
                warn!("camera worker gone");
                break;
            }
        }
    }

    drop(camera);
    info!(frames, elapsed = ?started.elapsed(), "all things done");
}
