use std::{
    io::{self, BufRead, BufReader, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use argh::FromArgs;
use color_eyre::eyre::{ensure, Context as _};
use rover_telemetry::DriveCommand;
use serialport::SerialPort;
use simulation::Simulation;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod simulation;

/// Pretend to be the rover's microcontroller: stream synthetic telemetry
/// frames and log the drive commands that come back
#[derive(FromArgs, Debug)]
struct Args {
    /// serial port to write frames to
    #[argh(positional)]
    port: String,

    /// serial baud rate
    #[argh(option, default = "115_200")]
    baud: u32,

    /// frames per second
    #[argh(option, default = "20")]
    rate: u32,

    /// flip the checksum of every Nth frame (0 disables)
    #[argh(option, default = "0")]
    corrupt_every: u64,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Args = argh::from_env();
    ensure!(args.rate > 0, "--rate must be at least 1");

    let shutdown = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler({
        let shutdown = Arc::clone(&shutdown);
        move || shutdown.store(true, Ordering::SeqCst)
    })
    .wrap_err("failed to install shutdown signal handler")?;

    let mut port = serialport::new(&args.port, args.baud)
        .timeout(Duration::from_millis(100))
        .open()
        .wrap_err_with(|| format!("failed to open serial port {}", args.port))?;

    let listener = port
        .try_clone()
        .wrap_err("failed to clone serial port handle")?;
    thread::Builder::new()
        .name("drive_listener".into())
        .spawn({
            let shutdown = Arc::clone(&shutdown);
            move || listen_for_commands(listener, &shutdown)
        })
        .wrap_err("failed to spawn drive listener thread")?;

    info!(port = %args.port, rate = args.rate, "streaming telemetry");

    let period = Duration::from_secs(1) / args.rate;
    let start = Instant::now();
    let mut simulation = Simulation::new();
    let mut sent: u64 = 0;

    while !shutdown.load(Ordering::SeqCst) {
        let timestamp_us = i64::try_from(start.elapsed().as_micros()).unwrap_or(i64::MAX);
        let packet = simulation.step(timestamp_us);
        let mut frame = packet.encode();

        sent += 1;
        if args.corrupt_every != 0 && sent % args.corrupt_every == 0 {
            if let Some(checksum) = frame.last_mut() {
                *checksum ^= 0xFF;
            }
            debug!(sent, "corrupted frame checksum");
        }

        port.write_all(&frame)
            .and_then(|()| port.flush())
            .wrap_err("failed to write telemetry frame")?;

        debug!(
            timestamp = %packet.timestamp(),
            battery_mv = packet.battery_mv,
            gyro_z = packet.gyro_z,
            enc_l = packet.enc_l,
            "sent frame"
        );

        thread::sleep(period);
    }

    info!(sent, "mock firmware stopped");

    Ok(())
}

fn listen_for_commands(port: Box<dyn SerialPort>, shutdown: &AtomicBool) {
    let mut reader = BufReader::new(port);
    let mut line = String::new();

    while !shutdown.load(Ordering::SeqCst) {
        match reader.read_line(&mut line) {
            Ok(0) => {
                info!("serial port closed");
                return;
            }
            Ok(_) if !line.ends_with('\n') => continue,
            Ok(_) => {
                match line.parse::<DriveCommand>() {
                    Ok(command) if command.is_stop() => info!(%command, "motors stopped"),
                    Ok(command) => info!(left = command.left, right = command.right, "drive"),
                    Err(error) => warn!(%error, line = line.trim_end(), "unrecognized command"),
                }

                line.clear();
            }
            // A partial line stays buffered in `line` until the rest arrives
            Err(error) if error.kind() == io::ErrorKind::TimedOut => {}
            Err(error) => {
                error!(%error, "failed to read from serial port");
                return;
            }
        }
    }
}
