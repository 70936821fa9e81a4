use std::{
    fmt::{self, Display},
    num::ParseIntError,
    str::FromStr,
};

use serde::Deserialize;

/// Serial line prefix understood by the firmware
pub const DRIVE_PREFIX: &str = "DRIVE:";

/// Left/right motor speeds, relayed verbatim to the microcontroller.
///
/// Speeds are not range checked here; the firmware maps them onto its PWM
/// range itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub struct DriveCommand {
    pub left: i32,
    pub right: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandParseError {
    #[error("drive command is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("drive command must be a JSON object")]
    NotAnObject,
    #[error("drive command line does not start with \"DRIVE:\"")]
    MissingPrefix,
    #[error("drive command line has no ',' between the speeds")]
    MissingSeparator,
    #[error("drive command line has an invalid speed: {0}")]
    Speed(#[from] ParseIntError),
}

impl DriveCommand {
    pub const STOP: Self = Self::new(0, 0);

    pub const fn new(left: i32, right: i32) -> Self {
        Self { left, right }
    }

    /// Parse an MQTT payload of the form `{"left": <int>, "right": <int>}`.
    ///
    /// Both keys must be present; anything else in the object is ignored.
    pub fn from_json(payload: &[u8]) -> Result<Self, CommandParseError> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;

        if !value.is_object() {
            return Err(CommandParseError::NotAnObject);
        }

        Ok(Self::deserialize(value)?)
    }

    /// The newline terminated ASCII line written to the serial port
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }

    pub const fn is_stop(&self) -> bool {
        self.left == 0 && self.right == 0
    }
}

impl Display for DriveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DRIVE_PREFIX}{},{}", self.left, self.right)
    }
}

/// Parses the serial form, `DRIVE:<left>,<right>`, surrounding whitespace
/// (including the line terminator) allowed.
impl FromStr for DriveCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let speeds = line
            .trim()
            .strip_prefix(DRIVE_PREFIX)
            .ok_or(CommandParseError::MissingPrefix)?;

        let (left, right) = speeds
            .split_once(',')
            .ok_or(CommandParseError::MissingSeparator)?;

        Ok(Self {
            left: left.trim().parse()?,
            right: right.trim().parse()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_payload() {
        let command = DriveCommand::from_json(br#"{"left":50,"right":-50}"#).unwrap();

        assert_eq!(command, DriveCommand::new(50, -50));
        assert_eq!(command.to_line(), "DRIVE:50,-50\n");
    }

    #[test]
    fn ignores_unknown_keys() {
        let command =
            DriveCommand::from_json(br#"{"right": 7, "left": 3, "source": "dashboard"}"#).unwrap();

        assert_eq!(command, DriveCommand::new(3, 7));
    }

    #[test]
    fn truncated_json_is_rejected() {
        assert!(matches!(
            DriveCommand::from_json(br#"{"left":50"#),
            Err(CommandParseError::Json(_))
        ));
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(matches!(
            DriveCommand::from_json(br#"{"left":50}"#),
            Err(CommandParseError::Json(_))
        ));
    }

    #[test]
    fn non_integer_speed_is_rejected() {
        assert!(DriveCommand::from_json(br#"{"left":50.5,"right":0}"#).is_err());
        assert!(DriveCommand::from_json(br#"{"left":"50","right":0}"#).is_err());
    }

    #[test]
    fn arrays_are_not_objects() {
        assert!(matches!(
            DriveCommand::from_json(b"[50, -50]"),
            Err(CommandParseError::NotAnObject)
        ));
    }

    #[test]
    fn speeds_are_passed_through_unclamped() {
        let command = DriveCommand::from_json(br#"{"left":-4000,"right":255}"#).unwrap();

        assert_eq!(command.to_line(), "DRIVE:-4000,255\n");
    }

    #[test]
    fn parses_serial_line() {
        assert_eq!(
            "DRIVE:50,-50\n".parse::<DriveCommand>().unwrap(),
            DriveCommand::new(50, -50)
        );
        assert_eq!(
            " DRIVE:0,0\r\n".parse::<DriveCommand>().unwrap(),
            DriveCommand::STOP
        );
    }

    #[test]
    fn malformed_serial_lines() {
        assert!(matches!(
            "STOP".parse::<DriveCommand>(),
            Err(CommandParseError::MissingPrefix)
        ));
        assert!(matches!(
            "DRIVE:50".parse::<DriveCommand>(),
            Err(CommandParseError::MissingSeparator)
        ));
        assert!(matches!(
            "DRIVE:fast,0".parse::<DriveCommand>(),
            Err(CommandParseError::Speed(_))
        ));
    }
}
