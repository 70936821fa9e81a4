use self::timestamp::Timestamp;

pub mod command;
pub mod frame;
pub mod payload;
pub mod timestamp;
pub mod topic;

pub use command::{CommandParseError, DriveCommand};
pub use frame::ChecksumError;

/// One decoded telemetry frame.
///
/// Only ever produced by [`TelemetryPacket::decode`] after the checksum has
/// been verified, or by [`TelemetryPacket::new`] which computes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryPacket {
    /// Microcontroller clock, microseconds since boot
    pub timestamp_us: i64,
    /// Degrees
    pub pitch: f32,
    /// Degrees
    pub roll: f32,
    /// Raw yaw rate
    pub gyro_z: i16,
    pub enc_l: i32,
    pub enc_r: i32,
    pub battery_mv: i16,
    pub checksum: u8,
}

impl TelemetryPacket {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp_us: i64,
        pitch: f32,
        roll: f32,
        gyro_z: i16,
        enc_l: i32,
        enc_r: i32,
        battery_mv: i16,
    ) -> Self {
        let mut packet = Self {
            timestamp_us,
            pitch,
            roll,
            gyro_z,
            enc_l,
            enc_r,
            battery_mv,
            checksum: 0,
        };

        packet.checksum = frame::checksum(&packet.encode_payload());

        packet
    }

    pub const fn timestamp(&self) -> Timestamp {
        Timestamp::from_micros(self.timestamp_us)
    }
}
