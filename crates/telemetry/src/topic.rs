//! MQTT topic names shared with the dashboard.

/// Inbound `{"left": <int>, "right": <int>}` drive commands
pub const DRIVE_COMMAND: &str = "robot/cmnd/drive";

pub const IMU: &str = "robot/tele/imu";
pub const BATTERY: &str = "robot/tele/battery";
pub const ENCODERS: &str = "robot/tele/encoders";
