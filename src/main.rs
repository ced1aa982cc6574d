#![allow(dead_code, clippy::similar_names)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]
mod config;
mod flight_control;
mod imaging;
mod keychain;
mod logger;
mod sim;
mod tracking;

use crate::config::FollowConfig;
use crate::imaging::{BlobDetector, FrameBuffer};
use crate::keychain::Keychain;
use crate::sim::{SimSettings, SimulatedVehicle};
use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

const STATUS_INTERVAL: Duration = Duration::from_secs(1);
const STREAM_INTERVAL: Duration = Duration::from_millis(100);

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let config = FollowConfig::from_env();
    info!("Starting follow controller with {:?}", config.tracking);
    let vehicle = Arc::new(SimulatedVehicle::new(SimSettings::default()));
    let keychain = Keychain::new(vehicle, config)
        .unwrap_or_else(|e| fatal!("Invalid tracking configuration: {e}"));

    let stream_tok = CancellationToken::new();
    let viewer = tokio::spawn(watch_stream(keychain.frames(), stream_tok.clone()));

    let f_cont = keychain.f_cont();
    if let Err(e) = f_cont.run_flight_sequence(Box::new(BlobDetector::default())).await {
        error!("Flight sequence failed: {e}");
    } else {
        fly(&keychain, Duration::from_secs(config.flight_secs)).await;
        match f_cont.stop_tracking().await {
            Ok(_) => info!("Flight finished."),
            Err(e) => error!("Stopping flight failed: {e}"),
        }
    }

    stream_tok.cancel();
    match viewer.await {
        Ok(bytes) => info!("Live view streamed {bytes} bytes."),
        Err(e) => error!("Live view task failed: {e}"),
    }
    keychain.actuator().disconnect().await;
    let status = keychain.f_cont().status();
    info!(
        "Final phase {}, {} commands, {:.1}s airborne.",
        status.phase, status.vehicle.total_commands, status.vehicle.total_flight_secs
    );
}

/// Reports status while tracking and nudges the follow distance once midway.
async fn fly(keychain: &Keychain, duration: Duration) {
    let f_cont = keychain.f_cont();
    let mut phase_rx = f_cont.watch_phase();
    let deadline = tokio::time::Instant::now() + duration;
    let midway = tokio::time::Instant::now() + duration / 2;
    let mut nudged = false;
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    while tokio::time::Instant::now() < deadline {
        tokio::select! {
            _ = ticker.tick() => {
                let status = f_cont.status();
                let flags = status.tracking.flags;
                log!(
                    "[{}] target: {}, fwd: {}, bwd: {}, centered: {}, velocity: {:?}, battery: {:?}%",
                    status.phase,
                    status.tracking.target_detected,
                    flags.forward,
                    flags.backward,
                    flags.center,
                    status.tracking.velocity,
                    status.vehicle.battery,
                );
            }
            changed = phase_rx.changed() => {
                if changed.is_err() || !phase_rx.borrow().is_airborne() {
                    warn!("Flight left the airborne phases early.");
                    return;
                }
            }
        }
        if !nudged && tokio::time::Instant::now() >= midway {
            nudged = true;
            match keychain.tracking().move_closer() {
                Ok(pair) => info!("Follow distance reduced, thresholds now {pair}."),
                Err(e) => warn!("Could not move closer: {e}"),
            }
        }
    }
}

/// Consumes the MJPEG stream like a viewer would and counts its bytes.
async fn watch_stream(frames: Arc<FrameBuffer>, c_tok: CancellationToken) -> usize {
    let mut stream = Box::pin(frames.mjpeg_stream(STREAM_INTERVAL, c_tok));
    let mut bytes = 0;
    while let Some(part) = stream.next().await {
        bytes += part.len();
    }
    bytes
}
