// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 home-sensors

//! Sensor Gateway CLI
//!
//! # Usage
//!
//! ```bash
//! # Run with a configuration file (TOML, or JSON if it ends in .json)
//! sensor-gateway --config gateway.toml
//!
//! # Log every relayed measurement
//! sensor-gateway --config gateway.toml --debug
//!
//! # Generate / check a configuration file
//! sensor-gateway gen-config --output gateway.toml
//! sensor-gateway validate --config gateway.toml
//! ```

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sensor_gateway::{GatewayConfig, Publisher, Relay, Sink, StopHandle, TypeRefresher};
use sensor_zmq::Subscriber;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

/// Sensor Gateway
#[derive(Parser, Debug)]
#[command(name = "sensor-gateway")]
#[command(about = "Relay sensor measurements from ZeroMQ to an HTTP API or an MQTT broker")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Debug logging, including every relayed measurement
    #[arg(short, long)]
    debug: bool,

    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "gateway.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        init_logging(&args.log_level, args.debug);
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(&output),
            Commands::Validate { config } => cmd_validate(&config),
        };
    }

    let config_path = args
        .config
        .ok_or_else(|| anyhow!("Missing --config (see `sensor-gateway gen-config`)"))?;
    let config = GatewayConfig::from_file(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let debug = args.debug || config.debug;
    init_logging(&args.log_level, debug);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.zmq_endpoint,
        publisher = %config.publisher,
        "Starting sensor gateway"
    );

    let subscriber = Subscriber::new(&config.zmq_endpoint)
        .with_context(|| format!("Failed to subscribe to {}", config.zmq_endpoint))?;

    let sink = Arc::new(Sink::from_config(&config).context("Failed to create publisher")?);
    tracing::info!(publisher = %sink.describe(), "Publisher ready");

    let mut refresher = match (sink.web_publisher(), config.background_refresh_interval()) {
        (Some(web), Some(interval)) => {
            Some(TypeRefresher::spawn(web, interval).context("Failed to start type refresher")?)
        }
        _ => None,
    };

    let mut relay = Relay::new(subscriber, sink, config.poll_timeout())
        .with_stats_interval(config.stats_interval())
        .with_debug(debug);

    ctrlc_handler(relay.stop_handle());
    relay.run();

    let stats = relay.stats().snapshot();
    tracing::info!(
        received = stats.received,
        published = stats.published,
        publish_errors = stats.publish_errors,
        recv_errors = stats.recv_errors,
        "Gateway shutdown"
    );

    // Teardown order: refresher, subscriber (socket, then context), sink.
    if let Some(refresher) = refresher.as_mut() {
        refresher.stop();
    }

    let (mut subscriber, sink) = relay.into_parts();
    if let Err(e) = subscriber.close() {
        tracing::warn!(error = %e, "Subscriber teardown failed");
    }
    if let Err(e) = sink.close() {
        tracing::warn!(error = %e, "Publisher teardown failed");
    }

    Ok(())
}

fn init_logging(level: &str, debug: bool) {
    fmt().with_env_filter(log_filter(level, debug)).with_target(false).init();
}

/// `RUST_LOG` when set, else `level`; `debug` raises both crates to debug.
fn log_filter(level: &str, debug: bool) -> EnvFilter {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if !debug {
        return filter;
    }
    ["sensor_gateway=debug", "sensor_zmq=debug"]
        .into_iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(filter, EnvFilter::add_directive)
}

fn cmd_gen_config(output: &Path) -> Result<()> {
    let toml_str = toml::to_string_pretty(&GatewayConfig::example()).context("Failed to serialize example")?;

    let content = format!(
        r#"# Sensor Gateway Configuration
# Generated by sensor-gateway gen-config
#
# publisher = "web":  web_url, web_update_types_interval (seconds),
#                     web_background_refresh_interval (seconds, optional)
# publisher = "mqtt": mqtt_broker, mqtt_topic, mqtt_user/mqtt_password (optional)

{}"#,
        toml_str
    );

    std::fs::write(output, content).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(path: &Path) -> Result<()> {
    match GatewayConfig::from_file(path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("ZeroMQ endpoint: {}", config.zmq_endpoint);
            println!("Publisher:       {}", config.publisher);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

/// Setup Ctrl+C / SIGTERM handler.
fn ctrlc_handler(stop_handle: StopHandle) {
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received shutdown signal, stopping...");
        stop_handle.stop();
    }) {
        tracing::warn!(error = %e, "Failed to install signal handler");
    }
}
