//! JSON bodies published for each decoded packet, one per topic in
//! [`crate::topic`].

use serde::Serialize;

use crate::TelemetryPacket;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImuPayload {
    pub pitch: f64,
    pub roll: f64,
    pub gyro_z: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatteryPayload {
    pub voltage_mv: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodersPayload {
    pub left: i32,
    pub right: i32,
    pub timestamp_us: i64,
}

/// Round to two decimal places, half away from zero.
///
/// Non-finite angles pass through and serialize as `null`.
fn hundredths(degrees: f32) -> f64 {
    (f64::from(degrees) * 100.0).round() / 100.0
}

impl From<&TelemetryPacket> for ImuPayload {
    fn from(packet: &TelemetryPacket) -> Self {
        Self {
            pitch: hundredths(packet.pitch),
            roll: hundredths(packet.roll),
            gyro_z: packet.gyro_z,
        }
    }
}

impl From<&TelemetryPacket> for BatteryPayload {
    fn from(packet: &TelemetryPacket) -> Self {
        Self {
            voltage_mv: packet.battery_mv,
        }
    }
}

impl From<&TelemetryPacket> for EncodersPayload {
    fn from(packet: &TelemetryPacket) -> Self {
        Self {
            left: packet.enc_l,
            right: packet.enc_r,
            timestamp_us: packet.timestamp_us,
        }
    }
}
