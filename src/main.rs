use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::RecvTimeoutError,
        Arc,
    },
    time::Duration,
};

use argh::FromArgs;
use color_eyre::eyre::{bail, Context as _};
use config::BridgeConfig;
use mqtt::{ConnectionSupervisor, MqttSink};
use publisher::TelemetryPublisher;
use rover_serial::{SerialWorkerController, SerialWorkerState};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod mqtt;
mod publisher;
mod relay;

/// How long the telemetry loop waits for a packet before re-checking for a
/// shutdown request
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Bridge between the rover's serial telemetry link and an MQTT broker
#[derive(FromArgs, Debug)]
struct Args {
    /// serial port the microcontroller is attached to
    #[argh(option, default = "String::from(\"/dev/ttyS0\")")]
    serial_port: String,

    /// serial baud rate
    #[argh(option, default = "115_200")]
    baud: u32,

    /// MQTT broker host name
    #[argh(option, default = "String::from(\"littlegreycell.local\")")]
    broker_host: String,

    /// MQTT broker port
    #[argh(option, default = "1883")]
    broker_port: u16,

    /// MQTT client id
    #[argh(option, default = "String::from(\"rover-bridge\")")]
    client_id: String,

    /// MQTT keep alive interval, in seconds
    #[argh(option, default = "60")]
    keep_alive: u64,

    /// serial read timeout in milliseconds (at most 1000)
    #[argh(option, default = "100")]
    read_timeout_ms: u64,

    /// list the available serial ports and exit
    #[argh(switch)]
    list: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Args = argh::from_env();

    if args.list {
        return list_ports();
    }

    let config = BridgeConfig::try_from(args)?;

    info!(
        version = git_version::git_version!(fallback = "unknown"),
        "starting rover bridge"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let shutdown = Arc::clone(&shutdown);
        move || {
            info!("shutdown requested");
            shutdown.store(true, Ordering::SeqCst);
        }
    })
    .wrap_err("failed to install shutdown signal handler")?;

    let serial = SerialWorkerController::spawn(config.serial.connector())
        .wrap_err_with(|| format!("failed to open serial port {}", config.serial.port))?;
    info!(port = serial.port_name(), baud = config.serial.baud_rate, "serial port open");

    let supervisor = ConnectionSupervisor::start(&config.mqtt, serial.command_sender());
    let publisher = TelemetryPublisher::new(supervisor.sink());

    let outcome = pump_telemetry(&serial, &publisher, &shutdown);
    if let Err(error) = &outcome {
        error!(?error, "critical fault, shutting down");
    }

    // Stop taking drive commands before the serial worker sends its final
    // stop, so nothing can be written after it
    supervisor.shutdown();
    serial.shutdown();

    info!("rover bridge stopped");

    outcome
}

/// Main polling loop: publish every packet the serial worker decodes until
/// shutdown is requested.
fn pump_telemetry(
    serial: &SerialWorkerController,
    publisher: &TelemetryPublisher<MqttSink>,
    shutdown: &AtomicBool,
) -> color_eyre::Result<()> {
    let mut last_state = serial.state();

    while !shutdown.load(Ordering::SeqCst) {
        match serial.recv_packet_timeout(POLL_INTERVAL) {
            Ok(packet) => {
                publisher.publish(packet);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => bail!("serial worker stopped unexpectedly"),
        }

        let state = serial.state();
        if state != last_state {
            match state {
                SerialWorkerState::Connected => info!("serial link restored"),
                SerialWorkerState::Disconnected => {
                    warn!("serial link lost, telemetry paused until it returns")
                }
            }

            last_state = state;
        }
    }

    Ok(())
}

fn list_ports() -> color_eyre::Result<()> {
    let ports = serialport::available_ports().wrap_err("failed to enumerate serial ports")?;

    if ports.is_empty() {
        println!("no serial ports found");
    }

    for port in ports {
        println!("{}\t{:?}", port.port_name, port.port_type);
    }

    Ok(())
}
