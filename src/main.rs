//! Burst capture demo driven by a synthetic sensor feed

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use burstcap::capture::frame::chroma_dimensions;
use burstcap::{BurstEvent, BurstHandle, Config, FileSink, RawFrame};
use color_eyre::{eyre::eyre, Result};
use tracing::{error, info, warn};

/// Sensor frame rate of the synthetic feed
const SENSOR_FPS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "burstcap=debug".into()),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Burstcap launching...");

    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    info!(
        "Burst of {} frames, {}ms apart, {}x{} into {}",
        config.burst.frame_count,
        config.burst.min_interval_ms,
        config.capture.width,
        config.capture.height,
        config.storage.output_dir.display()
    );

    let sink = Arc::new(FileSink::new(&config.storage));
    let handle = Arc::new(BurstHandle::spawn(&config, sink)?);

    // Spawn sensor task
    let sensor = {
        let handle = Arc::clone(&handle);
        let (width, height) = (config.capture.width, config.capture.height);
        tokio::spawn(async move {
            let epoch = Instant::now();
            let mut ticker = tokio::time::interval(Duration::from_millis(1000 / SENSOR_FPS));
            let mut sequence = 0u32;
            loop {
                ticker.tick().await;
                let frame = synthetic_frame(width, height, sequence, epoch.elapsed().as_millis() as u64);
                sequence = sequence.wrapping_add(1);
                match handle.try_submit_frame(frame) {
                    Ok(true) => {}
                    Ok(false) => warn!("Controller busy, sensor frame dropped"),
                    Err(e) => {
                        error!("Failed to send frame: {}", e);
                        break;
                    }
                }
            }
        })
    };

    handle.start(Some("demo".into())).await?;

    let outcome = tokio::select! {
        event = handle.next_event() => event?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, abandoning burst");
            handle.abandon().await?;
            sensor.abort();
            return Ok(());
        }
    };
    sensor.abort();

    match outcome {
        BurstEvent::Completed(result) => {
            info!(
                "Burst {} stored {} image(s), {} failed",
                result.session.0,
                result.images.len(),
                result.failed
            );
            for path in &result.images {
                println!("{}", path.display());
            }
        }
        BurstEvent::Failed { session, error } => {
            return Err(eyre!("Burst {} failed: {}", session.0, error));
        }
    }

    info!("Burstcap shutting down");
    Ok(())
}

/// Moving diagonal gradient with a slowly rotating tint
fn synthetic_frame(width: u32, height: u32, sequence: u32, timestamp_ms: u64) -> RawFrame {
    let (cw, ch) = chroma_dimensions(width, height);
    let shift = sequence.wrapping_mul(4);

    let mut y = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        for col in 0..width {
            y.push(((row + col + shift) % 220 + 16) as u8);
        }
    }

    let u = vec![(128 + (shift % 64)) as u8; cw * ch];
    let v = vec![(128 - (shift % 64)) as u8; cw * ch];
    RawFrame::packed(width, height, y, u, v, timestamp_ms)
}
