//! CLI Entry Point for scope_rig
//!
//! Provides command-line access to:
//! - serial port discovery
//! - a streaming session against the simulated camera
//! - optical channel selection over the serial link
//!
//! # Usage
//!
//! ```bash
//! scope_rig ports
//! scope_rig stream --frames 100 --snapshot
//! scope_rig channel GFP --port /dev/ttyUSB0
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scope_rig::camera::display::FrameDisplay;
use scope_rig::camera::mock::{MockCamera, MockCameraSystem};
use scope_rig::camera::panel::ControlPanel;
use scope_rig::camera::{CameraEvent, CameraSession};
use scope_rig::config::{RigConfig, DEFAULT_CONFIG_PATH};
use scope_rig::logging::{self, LoggingConfig, OutputFormat};
use scope_rig::serial::{OpticalChannel, PortBackend, SerialLink, SystemPorts};

/// Simulated sensor size used by `stream`.
const SIM_WIDTH: u32 = 640;
const SIM_HEIGHT: u32 = 480;

#[derive(Parser)]
#[command(name = "scope_rig")]
#[command(about = "Microscope rig camera and serial control", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "compact")]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// Stream from the simulated camera and report frames
    Stream {
        /// Stop after this many frames
        #[arg(long, default_value = "50")]
        frames: u64,

        /// Give up if no event arrives for this many seconds
        #[arg(long, default_value = "5")]
        timeout_secs: u64,

        /// Camera ID to select (overrides the config file)
        #[arg(long)]
        camera: Option<String>,

        /// Save the last frame as PNG into the snapshot directory
        #[arg(long)]
        snapshot: bool,
    },

    /// Switch the optical channel selector
    Channel {
        /// Channel index (0-4) or label (DAPI, GFP, RFP, "TX RED", Trans)
        channel: OpticalChannel,

        /// Port name or path (overrides the config file)
        #[arg(long)]
        port: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RigConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    config.validate()?;
    logging::init(LoggingConfig::from_rig_config(&config)?.with_format(cli.log_format))?;
    tracing::debug!(config = ?cli.config, "Starting {}", config.application.name);

    match cli.command {
        Commands::Ports => list_ports(),
        Commands::Stream {
            frames,
            timeout_secs,
            camera,
            snapshot,
        } => {
            let selector = camera.or_else(|| config.camera.camera_id.clone());
            stream(&config, selector, frames, Duration::from_secs(timeout_secs), snapshot).await
        }
        Commands::Channel { channel, port } => {
            select_channel(&config, port.or_else(|| config.serial.port.clone()), channel)
        }
    }
}

fn list_ports() -> Result<()> {
    let ports = SystemPorts.available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        println!("{:<12} {:<24} {}", port.name, port.system_location, port.description);
    }
    Ok(())
}

async fn stream(
    config: &RigConfig,
    selector: Option<String>,
    frames: u64,
    timeout: Duration,
    snapshot: bool,
) -> Result<()> {
    let camera = MockCamera::new("SIM-0001", SIM_WIDTH, SIM_HEIGHT)
        .with_model("Simulated Mono Camera")
        .with_row_padding(16);
    let system = MockCameraSystem::new().with_camera(camera);

    let (session, mut events) = CameraSession::new(Arc::new(system), config.camera.acquisition());
    let mut panel = ControlPanel::from_config(&config.controls, config.camera.enhance_contrast);
    let mut display = FrameDisplay::new(panel.enhance_contrast());

    session.start(selector.as_deref())?;

    let mut failure = None;
    while display.frames_shown() < frames {
        let event = match tokio::time::timeout(timeout, events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(_) => {
                failure = Some(format!("no camera event for {}s", timeout.as_secs()));
                break;
            }
        };
        match event {
            CameraEvent::StartedStreaming => {
                println!("Streaming started");
                panel.attach(session.controls());
                panel.apply_all();
            }
            CameraEvent::FrameReady(frame) => {
                display.on_frame(&frame)?;
                tracing::debug!(
                    frame = frame.frame_number(),
                    width = frame.width(),
                    height = frame.height(),
                    stride = frame.stride(),
                    "Frame"
                );
            }
            CameraEvent::ConversionFailed(reason) => println!("Frame dropped: {reason}"),
            CameraEvent::Error(message) => {
                failure = Some(message);
                break;
            }
            CameraEvent::StoppedStreaming => break,
        }
    }

    panel.detach();
    tokio::task::block_in_place(|| session.stop());
    while let Ok(event) = events.try_recv() {
        if event == CameraEvent::StoppedStreaming {
            println!("Streaming stopped");
        }
    }

    let stats = session.stats();
    println!(
        "Frames: {} shown, {} delivered, {} fallbacks, {} dropped",
        display.frames_shown(),
        stats.frames_delivered,
        stats.conversion_fallbacks,
        stats.frames_dropped
    );

    if snapshot {
        let path = display.save_snapshot(&config.camera.snapshot_dir)?;
        println!("Snapshot: {}", path.display());
    }

    match failure {
        Some(message) => anyhow::bail!("Camera session failed: {message}"),
        None => Ok(()),
    }
}

fn select_channel(config: &RigConfig, port: Option<String>, channel: OpticalChannel) -> Result<()> {
    let (link, _events) = SerialLink::new(Arc::new(SystemPorts), config.serial.settings());
    let opened = link.open(port.as_deref());
    println!("{}", link.status());
    opened?;

    let sent = link.select_channel(channel);
    println!("{}", link.status());
    sent?;

    link.close();
    Ok(())
}
