use std::{
    io::{BufReader, Write},
    ops::ControlFlow,
    sync::{
        mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc,
    },
    time::Duration,
};

use parking_lot::RwLock;
use rover_telemetry::{DriveCommand, TelemetryPacket};
use tracing::{debug, error, info, trace, warn};

mod connector;
mod controller;
mod error;
mod synchronizer;

#[cfg(test)]
mod mock;

pub use connector::{Connect, SerialPortConnector};
pub use controller::{DriveCommandSender, SerialWorkerController};
pub use error::{FrameReadError, FramingError, OpenError, TransportError, WorkerStopped};
pub use synchronizer::FrameSynchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SerialWorkerCommand {
    Drive(DriveCommand),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialWorkerState {
    Connected,
    Disconnected,
}

/// Sole owner of the serial port.
///
/// Alternates between writing queued drive commands and pulling one frame
/// off the port, so reads and writes never interleave. Dropping the worker
/// stops the motors before the port is released.
struct SerialWorker<C: Connect> {
    connector: C,
    reader: Option<BufReader<C::Port>>,
    synchronizer: FrameSynchronizer,

    packet_tx: Sender<TelemetryPacket>,
    command_rx: Receiver<SerialWorkerCommand>,
    state: Arc<RwLock<SerialWorkerState>>,

    reconnect_interval: Duration,
}

impl<C: Connect> SerialWorker<C> {
    fn run(mut self) {
        while self.step().is_continue() {}
    }

    /// Write out queued commands, then pull at most one frame off the port
    /// (or try to reopen it).
    fn step(&mut self) -> ControlFlow<()> {
        loop {
            let command = match self.command_rx.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("serial worker controller dropped");
                    return ControlFlow::Break(());
                }
            };

            if self.handle_command(command).is_break() {
                return ControlFlow::Break(());
            }
        }

        let Some(reader) = self.reader.as_mut() else {
            return self.reconnect();
        };

        match self.synchronizer.read_frame(reader) {
            Ok(packet) => {
                trace!(timestamp = %packet.timestamp(), "received telemetry packet");

                if self.packet_tx.send(packet).is_err() {
                    info!("telemetry receiver dropped");
                    return ControlFlow::Break(());
                }
            }
            Err(FrameReadError::Transport(TransportError::TimedOut)) => {}
            Err(FrameReadError::Transport(TransportError::SerialPortDisconnected)) => {
                info!("serial port disconnected");

                self.reader = None;
                self.set_state(SerialWorkerState::Disconnected);
            }
            Err(FrameReadError::Transport(TransportError::Io(error))) => {
                error!(%error, "unrecoverable serial port error");
                return ControlFlow::Break(());
            }
            Err(FrameReadError::Framing(error)) => {
                warn!(%error, "dropped serial data while seeking a frame");
            }
            Err(FrameReadError::Checksum(error)) => {
                warn!(%error, "dropped telemetry frame");
            }
        }

        ControlFlow::Continue(())
    }

    fn handle_command(&mut self, command: SerialWorkerCommand) -> ControlFlow<()> {
        match command {
            SerialWorkerCommand::Drive(command) => {
                self.write_command(command);
                ControlFlow::Continue(())
            }
            SerialWorkerCommand::Shutdown => {
                info!("serial worker shutting down");
                ControlFlow::Break(())
            }
        }
    }

    fn write_command(&mut self, command: DriveCommand) {
        let Some(reader) = self.reader.as_mut() else {
            warn!(%command, "serial port not connected, dropping drive command");
            return;
        };

        match write_line(reader.get_mut(), command) {
            Ok(()) => debug!(%command, "sent drive command"),
            Err(error) => warn!(%command, %error, "failed to send drive command"),
        }
    }

    /// Try to reopen the port, otherwise wait out the retry interval while
    /// still answering commands.
    fn reconnect(&mut self) -> ControlFlow<()> {
        match self.connector.connect() {
            Ok(Some(port)) => {
                info!(port = self.connector.port_name(), "serial port connected");

                self.reader = Some(BufReader::new(port));
                self.synchronizer = FrameSynchronizer::new();
                self.set_state(SerialWorkerState::Connected);

                return ControlFlow::Continue(());
            }
            Ok(None) => trace!("serial port not found... retrying"),
            Err(error) => warn!(%error, "failed to reopen serial port"),
        }

        match self.command_rx.recv_timeout(self.reconnect_interval) {
            Ok(command) => self.handle_command(command),
            Err(RecvTimeoutError::Timeout) => ControlFlow::Continue(()),
            Err(RecvTimeoutError::Disconnected) => {
                info!("serial worker controller dropped");
                ControlFlow::Break(())
            }
        }
    }

    fn set_state(&self, state: SerialWorkerState) {
        *self.state.write() = state;
    }
}

impl<C: Connect> Drop for SerialWorker<C> {
    fn drop(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            match write_line(reader.get_mut(), DriveCommand::STOP) {
                Ok(()) => info!("motors stopped, releasing serial port"),
                Err(error) => error!(%error, "failed to stop motors before releasing serial port"),
            }
        }

        self.set_state(SerialWorkerState::Disconnected);
    }
}

fn write_line(port: &mut impl Write, command: DriveCommand) -> std::io::Result<()> {
    port.write_all(command.to_line().as_bytes())?;
    port.flush()
}
