use std::{mem, sync::mpsc::Receiver, sync::Arc};

use parking_lot::RwLock;
use rover_telemetry::topic;
use tracing::{debug, error, info, warn};

use crate::relay::{CommandRelay, DriveSink, RelayError};

use super::{ConnectionState, Subscribe, TransportEvent};

/// Applies transport events in arrival order. The only writer of the
/// connection state.
pub(super) struct Dispatcher<S, D> {
    state: Arc<RwLock<ConnectionState>>,
    subscriber: S,
    relay: CommandRelay<D>,
}

impl<S: Subscribe, D: DriveSink> Dispatcher<S, D> {
    pub(super) fn new(
        state: Arc<RwLock<ConnectionState>>,
        subscriber: S,
        relay: CommandRelay<D>,
    ) -> Self {
        Self {
            state,
            subscriber,
            relay,
        }
    }

    pub(super) fn run(mut self, event_rx: Receiver<TransportEvent>) {
        for event in event_rx {
            self.handle(event);
        }

        debug!("transport event channel closed");
    }

    fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connecting => {
                self.transition(ConnectionState::Connecting);
            }
            TransportEvent::Connected => {
                self.transition(ConnectionState::Connected);

                // Sessions are clean, so the subscription has to be renewed
                // on every connect
                info!(topic = topic::DRIVE_COMMAND, "connected to broker, subscribing");

                if let Err(error) = self.subscriber.subscribe(topic::DRIVE_COMMAND) {
                    error!(%error, topic = topic::DRIVE_COMMAND, "failed to subscribe");
                }
            }
            TransportEvent::Disconnected { reason } => {
                if self.transition(ConnectionState::Disconnected) == ConnectionState::Connected {
                    warn!(%reason, "disconnected from broker");
                } else {
                    debug!(%reason, "broker not reachable");
                }
            }
            TransportEvent::Message { topic, payload } => {
                if topic != topic::DRIVE_COMMAND {
                    debug!(%topic, "ignoring message on unexpected topic");
                    return;
                }

                match self.relay.relay(&payload) {
                    Ok(command) => debug!(%command, "relayed drive command"),
                    Err(RelayError::Parse(error)) => error!(
                        payload = %String::from_utf8_lossy(&payload),
                        %error,
                        "dropping malformed drive command"
                    ),
                    Err(RelayError::Stopped(error)) => {
                        error!(%error, "cannot relay drive command")
                    }
                }
            }
        }
    }

    /// Returns the previous state
    fn transition(&self, next: ConnectionState) -> ConnectionState {
        let previous = mem::replace(&mut *self.state.write(), next);

        if previous != next {
            debug!(?previous, ?next, "connection state changed");
        }

        previous
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use rover_serial::WorkerStopped;
    use rover_telemetry::DriveCommand;
    use rumqttc::ClientError;
    use tracing::{Level, Subscriber};
    use tracing_subscriber::{
        layer::{Context, SubscriberExt},
        Layer, Registry,
    };

    use super::*;

    /// Records the level of every event logged while it is the default
    /// subscriber
    #[derive(Default, Clone)]
    struct LevelLog {
        levels: Arc<parking_lot::Mutex<Vec<Level>>>,
    }

    impl LevelLog {
        fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
            tracing::subscriber::with_default(Registry::default().with(self.clone()), f)
        }

        fn count(&self, level: Level) -> usize {
            self.levels.lock().iter().filter(|&&logged| logged == level).count()
        }
    }

    impl<S: Subscriber> Layer<S> for LevelLog {
        fn on_event(&self, event: &tracing::Event<'_>, _: Context<'_, S>) {
            self.levels.lock().push(*event.metadata().level());
        }
    }

    #[derive(Default, Clone)]
    struct Recorder {
        subscriptions: Rc<RefCell<Vec<String>>>,
        commands: Rc<RefCell<Vec<DriveCommand>>>,
    }

    impl Subscribe for Recorder {
        fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
            self.subscriptions.borrow_mut().push(topic.to_owned());
            Ok(())
        }
    }

    impl DriveSink for Recorder {
        fn send_drive(&self, command: DriveCommand) -> Result<(), WorkerStopped> {
            self.commands.borrow_mut().push(command);
            Ok(())
        }
    }

    fn dispatcher() -> (Dispatcher<Recorder, Recorder>, Recorder, Arc<RwLock<ConnectionState>>) {
        let recorder = Recorder::default();
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));

        let dispatcher = Dispatcher::new(
            Arc::clone(&state),
            recorder.clone(),
            CommandRelay::new(recorder.clone()),
        );

        (dispatcher, recorder, state)
    }

    fn message(topic: &str, payload: &[u8]) -> TransportEvent {
        TransportEvent::Message {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn follows_connection_lifecycle() {
        let (mut dispatcher, _, state) = dispatcher();

        dispatcher.handle(TransportEvent::Connecting);
        assert_eq!(*state.read(), ConnectionState::Connecting);

        dispatcher.handle(TransportEvent::Connected);
        assert_eq!(*state.read(), ConnectionState::Connected);

        dispatcher.handle(TransportEvent::Disconnected {
            reason: "broker went away".into(),
        });
        assert_eq!(*state.read(), ConnectionState::Disconnected);
    }

    #[test]
    fn resubscribes_on_every_connect() {
        let (mut dispatcher, recorder, _) = dispatcher();

        for event in [
            TransportEvent::Connecting,
            TransportEvent::Connected,
            TransportEvent::Disconnected {
                reason: "io error".into(),
            },
            TransportEvent::Connecting,
            TransportEvent::Connected,
        ] {
            dispatcher.handle(event);
        }

        assert_eq!(
            *recorder.subscriptions.borrow(),
            [topic::DRIVE_COMMAND, topic::DRIVE_COMMAND]
        );
    }

    #[test]
    fn relays_drive_commands() {
        let (mut dispatcher, recorder, _) = dispatcher();

        dispatcher.handle(message(topic::DRIVE_COMMAND, br#"{"left":50,"right":-50}"#));

        assert_eq!(*recorder.commands.borrow(), [DriveCommand::new(50, -50)]);
    }

    #[test]
    fn malformed_command_is_not_relayed() {
        let (mut dispatcher, recorder, _) = dispatcher();
        let log = LevelLog::default();

        log.capture(|| dispatcher.handle(message(topic::DRIVE_COMMAND, br#"{"left":50"#)));

        assert!(recorder.commands.borrow().is_empty());
        assert_eq!(log.count(Level::ERROR), 1);
    }

    #[test]
    fn ignores_other_topics() {
        let (mut dispatcher, recorder, _) = dispatcher();

        dispatcher.handle(message(topic::IMU, br#"{"left":50,"right":-50}"#));

        assert!(recorder.commands.borrow().is_empty());
    }
}
