//! NASA2MQTT - Samsung NASA bus to MQTT bridge
//!
//! This binary runs the bridge service:
//! - reads the NASA bus from a serial adapter or TCP gateway
//! - publishes decoded values to an MQTT broker
//! - forwards MQTT commands to the bus
//!
//! Settings come from an optional TOML file; command-line flags override it.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use nasa2mqtt::{
    MqttBridge, Nasa2Mqtt, Nasa2MqttConfig, SerialTransport, TcpInterface, TransportConfig,
    DEFAULT_BAUD_RATE,
};

#[derive(Parser)]
#[command(name = "nasa2mqtt")]
#[command(about = "Bridge a Samsung NASA bus to MQTT", version)]
struct Args {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Serial port of the RS-485 adapter (requires the `serial` feature)
    #[arg(long, conflicts_with = "tcp")]
    serial: Option<PathBuf>,

    /// Serial baud rate
    #[arg(long)]
    baud_rate: Option<u32>,

    /// TCP gateway as host:port
    #[arg(long)]
    tcp: Option<String>,

    /// MQTT broker host
    #[arg(long, env = "NASA2MQTT_MQTT_HOST")]
    mqtt_host: Option<String>,

    /// MQTT broker port
    #[arg(long)]
    mqtt_port: Option<u16>,

    /// MQTT username
    #[arg(long, env = "NASA2MQTT_MQTT_USERNAME")]
    mqtt_username: Option<String>,

    /// MQTT password
    #[arg(long, env = "NASA2MQTT_MQTT_PASSWORD", hide_env_values = true)]
    mqtt_password: Option<String>,

    /// Seconds between poll rounds
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Log every decoded frame
    #[arg(long)]
    debug_log_messages: bool,

    /// Log raw received bytes
    #[arg(long)]
    debug_log_messages_raw: bool,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,
}

impl Args {
    /// Load the config file, if any, and apply command-line overrides
    fn into_config(self) -> anyhow::Result<Nasa2MqttConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                toml::from_str::<Nasa2MqttConfig>(&text)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            }
            None => Nasa2MqttConfig::default(),
        };

        if let Some(port) = self.serial {
            config.transport = TransportConfig::Serial {
                port,
                baud_rate: self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
            };
        } else if let Some(gateway) = &self.tcp {
            let (host, port) = gateway
                .rsplit_once(':')
                .context("--tcp expects host:port")?;
            let port = port
                .parse()
                .with_context(|| format!("Invalid TCP port '{}'", port))?;
            config.transport = TransportConfig::Tcp {
                host: host.to_string(),
                port,
            };
        } else if let (Some(rate), TransportConfig::Serial { baud_rate, .. }) =
            (self.baud_rate, &mut config.transport)
        {
            *baud_rate = rate;
        }

        if let Some(host) = self.mqtt_host {
            config.mqtt.host = host;
        }
        if let Some(port) = self.mqtt_port {
            config.mqtt.port = port;
        }
        if let Some(username) = self.mqtt_username {
            config.mqtt.username = username;
        }
        if let Some(password) = self.mqtt_password {
            config.mqtt.password = password;
        }
        if let Some(secs) = self.poll_interval {
            config.poll.interval = Duration::from_secs(secs);
        }
        config.debug.log_messages |= self.debug_log_messages;
        config.debug.log_messages_raw |= self.debug_log_messages_raw;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging, RUST_LOG takes precedence over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.into_config()?;
    info!(version = nasa2mqtt::VERSION, "Starting NASA2MQTT");

    match config.transport.clone() {
        TransportConfig::Tcp { host, port } => {
            let transport = TcpInterface::new(format!("{}:{}", host, port));
            run(transport, config).await
        }
        TransportConfig::Serial { port, baud_rate } => run_serial(port, baud_rate, config).await,
    }
}

#[cfg(feature = "serial")]
async fn run_serial(port: PathBuf, baud_rate: u32, config: Nasa2MqttConfig) -> anyhow::Result<()> {
    let transport = nasa2mqtt::SerialInterface::new(&port).with_baud_rate(baud_rate);
    run(transport, config).await
}

#[cfg(not(feature = "serial"))]
async fn run_serial(port: PathBuf, _baud_rate: u32, _config: Nasa2MqttConfig) -> anyhow::Result<()> {
    anyhow::bail!(
        "serial port {} requested but this build lacks the `serial` feature; use --tcp or rebuild with --features serial",
        port.display()
    )
}

async fn run<T: SerialTransport + 'static>(transport: T, config: Nasa2MqttConfig) -> anyhow::Result<()> {
    let mqtt = if config.mqtt.is_enabled() {
        Some(MqttBridge::connect(&config.mqtt, &config.reconnect))
    } else {
        warn!("No MQTT host configured, values will only be logged");
        None
    };

    let (service, handle) = Nasa2Mqtt::new(transport, config, mqtt);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            if let Err(e) = handle.shutdown().await {
                warn!(error = %e, "Bridge already stopped");
            }
        }
    });

    if let Err(e) = service.run().await {
        error!(error = %e, code = e.error_code(), "Bridge stopped with error");
        return Err(e.into());
    }
    Ok(())
}
