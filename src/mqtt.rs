use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::sync_channel,
        Arc,
    },
    thread::{self, JoinHandle},
};

use parking_lot::RwLock;
use rumqttc::{Client, ClientError, QoS};
use tracing::{debug, error, info};

use crate::{
    config::MqttConfig,
    publisher::{PublishError, TelemetrySink},
    relay::{CommandRelay, DriveSink},
};

mod backoff;
mod dispatcher;
mod transport;

#[cfg(test)]
mod fake_broker;

pub use backoff::Backoff;

use self::dispatcher::Dispatcher;

/// Requests (publishes, subscribes) the client may queue for the event loop
const REQUEST_CAPACITY: usize = 64;

/// Transport events buffered between the event loop and the dispatcher
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Read-only view of the connection state, which only the supervisor's
/// dispatcher writes.
#[derive(Debug, Clone)]
pub struct ConnectionStateReader {
    state: Arc<RwLock<ConnectionState>>,
}

impl ConnectionStateReader {
    pub fn get(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TransportEvent {
    Connecting,
    Connected,
    Disconnected { reason: String },
    Message { topic: String, payload: Vec<u8> },
}

pub trait Subscribe {
    fn subscribe(&self, topic: &str) -> Result<(), ClientError>;
}

impl Subscribe for Client {
    fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
        self.try_subscribe(topic, QoS::AtMostOnce)
    }
}

/// Owns the broker session: the event loop thread, the dispatcher thread
/// and the connection state they maintain.
pub struct ConnectionSupervisor {
    client: Client,
    state: ConnectionStateReader,
    shutdown: Arc<AtomicBool>,

    transport: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl ConnectionSupervisor {
    /// Start connecting in the background. An unreachable broker is not an
    /// error; the transport keeps retrying until shut down.
    pub fn start<D>(config: &MqttConfig, drive: D) -> ConnectionSupervisor
    where
        D: DriveSink + Send + 'static,
    {
        info!(host = %config.host, port = config.port, "connecting to broker");

        let (client, connection) = Client::new(config.options(), REQUEST_CAPACITY);
        let (event_tx, event_rx) = sync_channel(EVENT_CAPACITY);

        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let shutdown = Arc::new(AtomicBool::new(false));

        let transport = thread::Builder::new()
            .name("mqtt_transport".into())
            .spawn({
                let shutdown = Arc::clone(&shutdown);
                let backoff = config.backoff();

                move || transport::main(connection, event_tx, shutdown, backoff)
            })
            .expect("failed to spawn mqtt transport thread");

        let dispatcher = thread::Builder::new()
            .name("mqtt_dispatcher".into())
            .spawn({
                let dispatcher = Dispatcher::new(
                    Arc::clone(&state),
                    client.clone(),
                    CommandRelay::new(drive),
                );

                move || dispatcher.run(event_rx)
            })
            .expect("failed to spawn mqtt dispatcher thread");

        Self {
            client,
            state: ConnectionStateReader { state },
            shutdown,

            transport: Some(transport),
            dispatcher: Some(dispatcher),
        }
    }

    /// Publishing side of the session, for the telemetry publisher
    pub fn sink(&self) -> MqttSink {
        MqttSink {
            client: self.client.clone(),
            state: self.state.clone(),
        }
    }

    /// Disconnect from the broker and wait for both background threads.
    /// No drive command is relayed once this returns.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("disconnecting from broker");

        request_disconnect(&self.client);

        for (name, handle) in [
            ("transport", self.transport.take()),
            ("dispatcher", self.dispatcher.take()),
        ] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    error!(thread = name, "mqtt thread panicked");
                }
            }
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Queue a disconnect, waiting for room if the request queue is full.
///
/// The wait ends once the event loop takes a request or the transport
/// thread exits and drops the connection, which it does on its next event
/// (or failed connect) once the shutdown flag is set.
fn request_disconnect(client: &Client) {
    let Err(error) = client.try_disconnect() else {
        return;
    };

    debug!(%error, "request queue busy, waiting to queue disconnect");

    if let Err(error) = client.disconnect() {
        debug!(%error, "broker event loop already stopped");
    }
}

#[derive(Clone)]
pub struct MqttSink {
    client: Client,
    state: ConnectionStateReader,
}

impl TelemetrySink for MqttSink {
    fn publish(&self, topic: &'static str, payload: Vec<u8>) -> Result<(), PublishError> {
        if !self.state.is_connected() {
            return Err(PublishError::NotConnected);
        }

        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)?;

        Ok(())
    }
}
