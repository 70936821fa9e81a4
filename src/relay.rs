use rover_serial::{DriveCommandSender, WorkerStopped};
use rover_telemetry::{CommandParseError, DriveCommand};

/// Somewhere drive commands can be queued for the serial port.
pub trait DriveSink {
    fn send_drive(&self, command: DriveCommand) -> Result<(), WorkerStopped>;
}

impl DriveSink for DriveCommandSender {
    fn send_drive(&self, command: DriveCommand) -> Result<(), WorkerStopped> {
        self.send(command)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Stopped(#[from] WorkerStopped),
}

/// Turns inbound drive command payloads into serial drive commands.
///
/// A payload that does not parse is never forwarded, not even partially.
pub struct CommandRelay<D> {
    drive: D,
}

impl<D: DriveSink> CommandRelay<D> {
    pub fn new(drive: D) -> Self {
        Self { drive }
    }

    pub fn relay(&self, payload: &[u8]) -> Result<DriveCommand, RelayError> {
        let command = DriveCommand::from_json(payload)?;

        self.drive.send_drive(command)?;

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        lines: RefCell<Vec<String>>,
    }

    impl DriveSink for RecordingSink {
        fn send_drive(&self, command: DriveCommand) -> Result<(), WorkerStopped> {
            self.lines.borrow_mut().push(command.to_line());
            Ok(())
        }
    }

    struct StoppedSink;

    impl DriveSink for StoppedSink {
        fn send_drive(&self, _: DriveCommand) -> Result<(), WorkerStopped> {
            Err(WorkerStopped)
        }
    }

    #[test]
    fn relays_well_formed_command() {
        let relay = CommandRelay::new(RecordingSink::default());

        let command = relay.relay(br#"{"left":50,"right":-50}"#).unwrap();

        assert_eq!(command, DriveCommand::new(50, -50));
        assert_eq!(*relay.drive.lines.borrow(), ["DRIVE:50,-50\n"]);
    }

    #[test]
    fn truncated_payload_writes_nothing() {
        let relay = CommandRelay::new(RecordingSink::default());

        assert!(matches!(
            relay.relay(br#"{"left":50"#),
            Err(RelayError::Parse(_))
        ));
        assert!(relay.drive.lines.borrow().is_empty());
    }

    #[test]
    fn missing_right_speed_writes_nothing() {
        let relay = CommandRelay::new(RecordingSink::default());

        assert!(relay.relay(br#"{"left":50}"#).is_err());
        assert!(relay.drive.lines.borrow().is_empty());
    }

    #[test]
    fn reports_stopped_worker() {
        let relay = CommandRelay::new(StoppedSink);

        assert!(matches!(
            relay.relay(br#"{"left":0,"right":0}"#),
            Err(RelayError::Stopped(WorkerStopped))
        ));
    }
}
