use rover_telemetry::TelemetryPacket;

const BATTERY_FULL_MV: i16 = 12_600;
const BATTERY_EMPTY_MV: i16 = 6_000;
const BATTERY_STEP_MV: i16 = 20;

/// Encoder counts wrap back to zero after this
const ENCODER_WRAP: i32 = 11;

/// Synthetic rover motion: a slow full turn, a swaying horizon and a battery
/// that drains and recharges forever.
#[derive(Debug, Clone)]
pub struct Simulation {
    /// Degrees, `0..360`
    angle: i16,
    battery_mv: i16,
    battery_step: i16,
    encoder_count: i32,
}

impl Simulation {
    pub const fn new() -> Self {
        Self {
            angle: 0,
            battery_mv: BATTERY_FULL_MV,
            battery_step: -BATTERY_STEP_MV,
            encoder_count: 0,
        }
    }

    /// Advance one tick and sample it
    pub fn step(&mut self, timestamp_us: i64) -> TelemetryPacket {
        self.angle = (self.angle + 1) % 360;

        self.battery_mv += self.battery_step;
        if self.battery_mv >= BATTERY_FULL_MV {
            self.battery_step = -BATTERY_STEP_MV;
        } else if self.battery_mv <= BATTERY_EMPTY_MV {
            self.battery_step = BATTERY_STEP_MV;
        }

        self.encoder_count = (self.encoder_count + 1) % ENCODER_WRAP;

        let theta = f32::from(self.angle).to_radians();

        TelemetryPacket::new(
            timestamp_us,
            15.0 * (2.0 * theta).sin(),
            25.0 * theta.cos(),
            self.angle,
            self.encoder_count,
            self.encoder_count * 9 / 10,
            self.battery_mv,
        )
    }
}
