use std::time::Duration;

use color_eyre::eyre::{bail, ensure};
use rover_serial::SerialPortConnector;
use rumqttc::MqttOptions;

use crate::{mqtt::Backoff, Args};

/// Serial reads must stay bounded so shutdown requests are noticed promptly
const MAX_READ_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub serial: SerialConfig,
    pub mqtt: MqttConfig,
}

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub reconnect_initial: Duration,
    pub reconnect_max: Duration,
}

impl TryFrom<Args> for BridgeConfig {
    type Error = color_eyre::Report;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let read_timeout = Duration::from_millis(args.read_timeout_ms);
        if read_timeout.is_zero() || read_timeout > MAX_READ_TIMEOUT {
            bail!(
                "--read-timeout-ms must be between 1 and {}",
                MAX_READ_TIMEOUT.as_millis()
            );
        }

        ensure!(
            args.keep_alive >= 5,
            "--keep-alive must be at least 5 seconds"
        );
        ensure!(!args.client_id.is_empty(), "--client-id must not be empty");

        let backoff = Backoff::default();

        Ok(Self {
            serial: SerialConfig {
                port: args.serial_port,
                baud_rate: args.baud,
                read_timeout,
            },
            mqtt: MqttConfig {
                host: args.broker_host,
                port: args.broker_port,
                client_id: args.client_id,
                keep_alive: Duration::from_secs(args.keep_alive),
                reconnect_initial: backoff.initial(),
                reconnect_max: backoff.max(),
            },
        })
    }
}

impl SerialConfig {
    pub fn connector(&self) -> SerialPortConnector {
        SerialPortConnector::new(self.port.as_str(), self.baud_rate, self.read_timeout)
    }
}

impl MqttConfig {
    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(true);
        options
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.reconnect_initial, self.reconnect_max)
    }
}
