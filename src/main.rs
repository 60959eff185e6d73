//! # RC Link
//!
//! Runs the controller node on a host: gamepad sticks and D-pad stand in for
//! the analog joysticks and the keypad ladder, parameters persist to an image
//! file, and the radio is either an in-process loopback (with a simulated
//! receiver) or a serial radio bridge.

use std::env;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use rc_link::clock::{Clock, ClockGate, SystemClock};
use rc_link::config::{Config, LoggingConfig, Transport};
use rc_link::input::gamepad::{Gamepad, GamepadInputs};
use rc_link::input::SharedAnalog;
use rc_link::link::{LoopbackRadio, ReceiverLink, ReceiverNode, SerialRadio, Transceiver};
use rc_link::scheduler::ControllerNode;
use rc_link::store::{FileStore, DEFAULT_CAPACITY};
use rc_link::telemetry::TelemetryLogger;
use rc_link::ui::{LogDisplay, LogIndicator, TextSink};

/// Configuration file used when none is given on the command line.
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Interval between link status lines.
const STATUS_INTERVAL_MS: u32 = 5000;

type Receiver = ReceiverNode<LoopbackRadio, SharedAnalog, SystemClock>;

fn env_filter() -> EnvFilter {
    EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
}

/// Console logging, plus a daily rolling file when `file_dir` is set.
///
/// The returned guard must live until shutdown so buffered lines are flushed.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    match &config.file_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rc-link.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(env_filter())
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(env_filter()).init();
            None
        }
    }
}

/// Loads the configuration named on the command line, or the default file
/// if present, or built-in defaults.
fn load_config() -> Result<(Config, String)> {
    match env::args().nth(1) {
        Some(path) => {
            let config = Config::load(&path).with_context(|| format!("Failed to load {}", path))?;
            Ok((config, path))
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            let config = Config::load(DEFAULT_CONFIG_PATH)
                .with_context(|| format!("Failed to load {}", DEFAULT_CONFIG_PATH))?;
            Ok((config, DEFAULT_CONFIG_PATH.to_string()))
        }
        None => Ok((Config::default(), "built-in defaults".to_string())),
    }
}

/// Opens the radio for the configured transport.
///
/// With the loopback transport, also returns the simulated receiver; its aux
/// line follows `aux`.
fn open_radio(config: &Config, aux: SharedAnalog) -> Result<(Box<dyn Transceiver>, Option<Receiver>)> {
    match config.link.transport {
        Transport::Loopback => {
            let (controller, receiver) = LoopbackRadio::pair();
            let link = ReceiverLink::new(receiver, &config.link.radio())?;
            let node = ReceiverNode::new(link, aux, SystemClock::new());
            info!("Using loopback radio with simulated receiver");
            Ok((Box::new(controller), Some(node)))
        }
        Transport::Serial => {
            let radio = if config.link.serial_port.is_empty() {
                SerialRadio::open(config.link.baud_rate)?
            } else {
                SerialRadio::open_with_paths(&[config.link.serial_port.as_str()], config.link.baud_rate)?
            };
            info!("Using radio bridge at {}", radio.device_path());
            Ok((Box::new(radio), None))
        }
    }
}

/// Main entry point.
///
/// # Control Flow
///
/// 1. Load configuration and set up logging
/// 2. Open the parameter image, the gamepad and the radio
/// 3. Boot the controller node (loads calibration, deadzone, expo, key thresholds)
/// 4. Tick the node at the link rate until Ctrl+C, logging telemetry records
///    at the configured interval
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the parameter image
/// cannot be read, or the radio cannot be opened.
#[tokio::main]
async fn main() -> Result<()> {
    let (config, config_source) = load_config()?;
    let _log_guard = init_logging(&config.logging);

    info!("RC Link v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config_source);

    let store = FileStore::open(&config.store.path, DEFAULT_CAPACITY)
        .with_context(|| format!("Failed to open parameter image {}", config.store.path))?;

    let inputs = GamepadInputs::at_rest();
    let mut gamepad = match Gamepad::open() {
        Ok(pad) => {
            info!("Gamepad: {} ({})", pad.name().unwrap_or("unnamed"), pad.device_path());
            Some(pad)
        }
        Err(e) => {
            warn!("{}; sticks stay centered", e);
            None
        }
    };

    let (radio, mut receiver) = open_radio(&config, inputs.right_y.clone())?;

    let clock = SystemClock::new();
    let mut node = ControllerNode::boot(
        store,
        clock,
        inputs.keypad.clone(),
        [
            inputs.left_x.clone(),
            inputs.left_y.clone(),
            inputs.right_x.clone(),
            inputs.right_y.clone(),
        ],
        radio,
        &config,
    )?;

    let mut telemetry = if config.telemetry.enabled {
        Some(TelemetryLogger::new(&config.telemetry)?)
    } else {
        None
    };

    let mut led = LogIndicator::new();
    let mut display = LogDisplay::new();
    let mut status_gate = ClockGate::armed_at(STATUS_INTERVAL_MS, clock.now_ms());

    let tick_ms = config.link.tx_interval_ms.min(config.link.indicator_interval_ms).max(1);
    let mut ticker = interval(Duration::from_millis(u64::from(tick_ms)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut log_ticker = interval(Duration::from_millis(config.telemetry.log_interval_ms));

    info!("Running, tick every {} ms. Press Ctrl+C to exit", tick_ms);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let poll_error = gamepad.as_mut().and_then(|pad| pad.poll(&inputs).err());
                if let Some(e) = poll_error {
                    warn!("{}; releasing sticks and keys", e);
                    inputs.release();
                    gamepad = None;
                }

                if let Some(rx) = receiver.as_mut() {
                    rx.tick();
                }

                let report = node.tick(&mut led);
                if let Some(frame) = report.frame {
                    debug!("TX {:?} -> {:?}", frame, report.outcome);
                }
                if !node.render(&mut display) {
                    display.clear();
                }

                if status_gate.ready(clock.now_ms()) {
                    node.log_link_stats();
                }
            }

            _ = log_ticker.tick() => {
                if let Some(logger) = telemetry.as_mut() {
                    if let Err(e) = logger.log(&node.record()) {
                        warn!("Failed to write telemetry record: {}", e);
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                let stats = node.link().stats();
                info!("Total packets: {} sent, {} acknowledged", stats.tx_attempts, stats.acks);
                if let Some(logger) = telemetry.as_mut() {
                    if let Err(e) = logger.flush() {
                        warn!("Failed to flush telemetry log: {}", e);
                    }
                }
                break;
            }
        }
    }

    Ok(())
}
