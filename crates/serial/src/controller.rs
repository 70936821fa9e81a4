use std::{
    io::BufReader,
    sync::{
        mpsc::{channel, Receiver, RecvTimeoutError, Sender},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::RwLock;
use rover_telemetry::{DriveCommand, TelemetryPacket};
use tracing::error;

use crate::{
    Connect, FrameSynchronizer, OpenError, SerialWorker, SerialWorkerCommand, SerialWorkerState,
    WorkerStopped,
};

const RECONNECT_INTERVAL: Duration = Duration::from_millis(1000);

/// Handle to the thread that owns the serial port.
///
/// Dropping the controller (or calling [`shutdown`](Self::shutdown)) stops
/// the worker, which sends a final stop command before closing the port.
pub struct SerialWorkerController {
    port_name: Arc<str>,

    state: Arc<RwLock<SerialWorkerState>>,
    command_tx: Sender<SerialWorkerCommand>,
    packet_rx: Receiver<TelemetryPacket>,

    handle: Option<JoinHandle<()>>,
}

impl SerialWorkerController {
    /// Open the port and start the worker. Failing to open the port here is
    /// not retried.
    pub fn spawn<C: Connect>(mut connector: C) -> Result<SerialWorkerController, OpenError> {
        let port = connector.connect()?.ok_or_else(|| OpenError::NotFound {
            port: connector.port_name().to_owned(),
        })?;

        let (packet_tx, packet_rx) = channel();
        let (command_tx, command_rx) = channel();

        let state = Arc::new(RwLock::new(SerialWorkerState::Connected));

        let port_name = Arc::from(connector.port_name());

        let handle = thread::Builder::new()
            .name("serial_worker".into())
            .spawn({
                let state = Arc::clone(&state);

                move || {
                    SerialWorker {
                        connector,
                        reader: Some(BufReader::new(port)),
                        synchronizer: FrameSynchronizer::new(),

                        packet_tx,
                        command_rx,
                        state,

                        reconnect_interval: RECONNECT_INTERVAL,
                    }
                    .run()
                }
            })
            .expect("failed to spawn serial worker thread");

        Ok(Self {
            port_name,

            state,
            command_tx,
            packet_rx,

            handle: Some(handle),
        })
    }

    pub fn state(&self) -> SerialWorkerState {
        *self.state.read()
    }

    pub fn port_name(&self) -> &str {
        self.port_name.as_ref()
    }

    /// A cloneable handle for queueing drive commands from other threads
    pub fn command_sender(&self) -> DriveCommandSender {
        DriveCommandSender {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Wait up to `timeout` for the next decoded packet.
    ///
    /// [`RecvTimeoutError::Disconnected`] means the worker has exited.
    pub fn recv_packet_timeout(
        &self,
        timeout: Duration,
    ) -> Result<TelemetryPacket, RecvTimeoutError> {
        self.packet_rx.recv_timeout(timeout)
    }

    /// Stop the worker and wait for it to release the port.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        // Already gone if the worker exited on its own; joining still applies
        let _ = self.command_tx.send(SerialWorkerCommand::Shutdown);

        if handle.join().is_err() {
            error!("serial worker panicked");
        }
    }
}

impl Drop for SerialWorkerController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Queues drive commands onto the serial worker.
///
/// Commands are written in the order they were sent.
#[derive(Debug, Clone)]
pub struct DriveCommandSender {
    command_tx: Sender<SerialWorkerCommand>,
}

impl DriveCommandSender {
    pub fn send(&self, command: DriveCommand) -> Result<(), WorkerStopped> {
        self.command_tx
            .send(SerialWorkerCommand::Drive(command))
            .map_err(|_| WorkerStopped)
    }
}
