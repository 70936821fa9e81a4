//! Drives the rumqttc event loop and turns what it reports into
//! [`TransportEvent`]s for the dispatcher.

use std::{
    ops::ControlFlow,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::SyncSender,
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use rumqttc::{Connection, Event, Outgoing, Packet};
use tracing::{debug, info, warn};

use super::{Backoff, TransportEvent};

const SHUTDOWN_POLL: Duration = Duration::from_millis(100);

/// Runs until shutdown is requested, the client sends a disconnect, or every
/// client handle is dropped.
///
/// The shutdown flag is checked before every notification, so a busy
/// connection stops after its next event even when no disconnect request
/// made it into the client's queue.
pub(super) fn main(
    mut connection: Connection,
    event_tx: SyncSender<TransportEvent>,
    shutdown: Arc<AtomicBool>,
    mut backoff: Backoff,
) {
    if event_tx.send(TransportEvent::Connecting).is_err() {
        return;
    }

    let mut notifications = connection.iter();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            debug!("shutdown requested, leaving event loop");
            break;
        }

        let Some(notification) = notifications.next() else {
            debug!("all clients dropped");
            break;
        };

        let event = match notification {
            Ok(event) => match translate(event, &mut backoff) {
                ControlFlow::Continue(Some(event)) => event,
                ControlFlow::Continue(None) => continue,
                ControlFlow::Break(()) => break,
            },
            Err(error) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }

                let delay = backoff.next_delay();
                warn!(%error, ?delay, "broker connection lost, retrying");

                if event_tx
                    .send(TransportEvent::Disconnected {
                        reason: error.to_string(),
                    })
                    .is_err()
                {
                    return;
                }

                if !sleep_unless_shutdown(delay, &shutdown) {
                    break;
                }

                TransportEvent::Connecting
            }
        };

        if event_tx.send(event).is_err() {
            return;
        }
    }

    info!("broker transport stopped");

    let _ = event_tx.send(TransportEvent::Disconnected {
        reason: "transport stopped".into(),
    });
}

/// Map one successful notification. `Break` ends the event loop.
fn translate(event: Event, backoff: &mut Backoff) -> ControlFlow<(), Option<TransportEvent>> {
    match event {
        Event::Incoming(Packet::ConnAck(_)) => {
            backoff.reset();
            ControlFlow::Continue(Some(TransportEvent::Connected))
        }
        Event::Incoming(Packet::Publish(publish)) => {
            ControlFlow::Continue(Some(TransportEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            }))
        }
        Event::Outgoing(Outgoing::Disconnect) => {
            debug!("disconnect sent to broker");
            ControlFlow::Break(())
        }
        _ => ControlFlow::Continue(None),
    }
}

/// Returns `false` if shutdown was requested before `duration` elapsed.
fn sleep_unless_shutdown(duration: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;

    loop {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }

        thread::sleep(remaining.min(SHUTDOWN_POLL));
    }
}
