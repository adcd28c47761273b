use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vehicle_sim::assets::{AssetSource, DirAssetSource, MemoryAssetSource, load_all, required_assets};
use vehicle_sim::driver::{HostEvent, run_frame_loop};
use vehicle_sim::sync::FrameSnapshot;
use vehicle_sim::{SimConfig, SimResult, SimulationContext};

const CONFIG_ENV: &str = "VEHICLE_SIM_CONFIG";
const ASSETS_ENV: &str = "VEHICLE_SIM_ASSETS";

#[tokio::main]
async fn main() {
    // stdout carries frames, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        error!(%err, "simulation failed");
        std::process::exit(1);
    }
}

async fn run() -> SimResult<()> {
    info!("starting vehicle simulation");

    let config = match std::env::var_os(CONFIG_ENV) {
        Some(path) => SimConfig::load(PathBuf::from(path))?,
        None => SimConfig::default(),
    };

    let source: Box<dyn AssetSource> = match std::env::var_os(ASSETS_ENV) {
        Some(root) => Box::new(DirAssetSource { root: PathBuf::from(root) }),
        None => Box::new(MemoryAssetSource::default_car()),
    };
    let assets = load_all(
        source.as_ref(),
        &required_assets(&config.assets),
        Duration::from_millis(config.assets.timeout_ms),
    )
    .await?;

    let frame_interval = Duration::from_millis(config.frame.interval_ms);
    let ctx = SimulationContext::build(config, &assets)?;

    let (event_tx, event_rx) = mpsc::unbounded_channel::<HostEvent>();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<FrameSnapshot>();

    // Host input: one command per stdin line.
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match HostEvent::parse_line(&line) {
                Some(event) => {
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!(line = %line, "unrecognized host command"),
            }
        }
        info!("host input closed");
    });

    // Render side: JSON line per frame.
    tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => println!("{json}"),
                Err(err) => warn!(%err, "frame not serialized"),
            }
        }
    });

    run_frame_loop(ctx, event_rx, frame_tx, frame_interval, None).await;
    Ok(())
}
