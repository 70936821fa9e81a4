//! Binary telemetry frame layout.
//!
//! ```text
//! [0xAA][0x55][i64 timestamp_us][f32 pitch][f32 roll][i16 gyro_z]
//! [i32 enc_l][i32 enc_r][i16 battery_mv][u8 checksum]
//! ```
//!
//! Every field is little-endian. The checksum is the XOR of the 28 body
//! bytes preceding it, so any single corrupted byte is caught but two
//! corruptions that cancel out are not.

#![forbid(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]

use std::mem::size_of;

use crate::TelemetryPacket;

/// Start-of-frame marker
pub const MARKER: [u8; 2] = [0xAA, 0x55];

/// Everything after the marker, checksum included
pub const BODY_LEN: usize = size_of::<i64>()
    + size_of::<f32>()
    + size_of::<f32>()
    + size_of::<i16>()
    + size_of::<i32>()
    + size_of::<i32>()
    + size_of::<i16>()
    + size_of::<u8>();

/// Body bytes covered by the checksum
pub const PAYLOAD_LEN: usize = BODY_LEN - 1;

pub const FRAME_LEN: usize = MARKER.len() + BODY_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("checksum mismatch: computed {computed:#04x}, frame carries {received:#04x}")]
pub struct ChecksumError {
    pub computed: u8,
    pub received: u8,
}

/// XOR fold of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |checksum, byte| checksum ^ byte)
}

impl TelemetryPacket {
    /// Validate and unpack a frame body (the 29 bytes following the marker).
    pub fn decode(body: &[u8; BODY_LEN]) -> Result<Self, ChecksumError> {
        let (payload, received) = body.split_at(PAYLOAD_LEN);
        let received = received[0];

        let computed = checksum(payload);
        if computed != received {
            return Err(ChecksumError { computed, received });
        }

        let mut offset = 0;

        macro_rules! field {
            (as $ty:ty) => {{
                let mut bytes = [0u8; size_of::<$ty>()];
                bytes.copy_from_slice(&payload[offset..offset + size_of::<$ty>()]);
                offset += size_of::<$ty>();

                <$ty>::from_le_bytes(bytes)
            }};
        }

        let packet = TelemetryPacket {
            timestamp_us: field!(as i64),
            pitch: field!(as f32),
            roll: field!(as f32),
            gyro_z: field!(as i16),
            enc_l: field!(as i32),
            enc_r: field!(as i32),
            battery_mv: field!(as i16),
            checksum: received,
        };

        debug_assert_eq!(offset, PAYLOAD_LEN);

        Ok(packet)
    }

    /// The 28 checksummed body bytes
    pub fn encode_payload(&self) -> [u8; PAYLOAD_LEN] {
        let mut payload = [0u8; PAYLOAD_LEN];
        let mut offset = 0;

        macro_rules! put {
            ($value:expr) => {{
                let bytes = $value.to_le_bytes();
                payload[offset..offset + bytes.len()].copy_from_slice(&bytes);
                offset += bytes.len();
            }};
        }

        put!(self.timestamp_us);
        put!(self.pitch);
        put!(self.roll);
        put!(self.gyro_z);
        put!(self.enc_l);
        put!(self.enc_r);
        put!(self.battery_mv);

        debug_assert_eq!(offset, PAYLOAD_LEN);

        payload
    }

    /// Full wire frame, marker included. The checksum is recomputed from the
    /// fields rather than copied from [`TelemetryPacket::checksum`].
    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let payload = self.encode_payload();

        let mut frame = [0u8; FRAME_LEN];
        frame[..MARKER.len()].copy_from_slice(&MARKER);
        frame[MARKER.len()..FRAME_LEN - 1].copy_from_slice(&payload);
        frame[FRAME_LEN - 1] = checksum(&payload);

        frame
    }
}
