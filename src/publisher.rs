use rover_telemetry::{
    payload::{BatteryPayload, EncodersPayload, ImuPayload},
    topic, TelemetryPacket,
};
use serde::Serialize;
use tracing::{debug, trace, warn};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("not connected to the broker")]
    NotConnected,
    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Client(#[from] rumqttc::ClientError),
}

pub trait TelemetrySink {
    fn publish(&self, topic: &'static str, payload: Vec<u8>) -> Result<(), PublishError>;
}

/// Fans one packet out to the IMU, battery and encoder topics, in that
/// order. Each publish stands alone: one failing does not stop the others.
pub struct TelemetryPublisher<S> {
    sink: S,
}

impl<S: TelemetrySink> TelemetryPublisher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Returns how many of the three messages were handed to the sink
    pub fn publish(&self, packet: TelemetryPacket) -> usize {
        trace!(timestamp = %packet.timestamp(), "publishing telemetry");

        [
            self.publish_one(topic::IMU, &ImuPayload::from(&packet)),
            self.publish_one(topic::BATTERY, &BatteryPayload::from(&packet)),
            self.publish_one(topic::ENCODERS, &EncodersPayload::from(&packet)),
        ]
        .into_iter()
        .filter(|&published| published)
        .count()
    }

    fn publish_one(&self, topic: &'static str, payload: &impl Serialize) -> bool {
        let result = serde_json::to_vec(payload)
            .map_err(PublishError::from)
            .and_then(|payload| self.sink.publish(topic, payload));

        match result {
            Ok(()) => true,
            Err(PublishError::NotConnected) => {
                debug!(topic, "broker not connected, telemetry skipped");
                false
            }
            Err(error) => {
                warn!(topic, %error, "failed to publish telemetry");
                false
            }
        }
    }
}
