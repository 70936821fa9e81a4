use std::{
    io::{Read, Write},
    sync::Arc,
    time::Duration,
};

use serialport::SerialPort;

/// Source of serial port handles for the worker.
pub trait Connect: Send + 'static {
    type Port: Read + Write + Send + 'static;

    fn port_name(&self) -> &str;

    /// `Ok(None)` means the device is not present (yet), which is worth
    /// retrying; any other failure is an error.
    fn connect(&mut self) -> Result<Option<Self::Port>, serialport::Error>;
}

#[derive(Debug, Clone)]
pub struct SerialPortConnector {
    port_name: Arc<str>,
    baud_rate: u32,
    read_timeout: Duration,
}

impl SerialPortConnector {
    pub fn new(port_name: impl Into<Arc<str>>, baud_rate: u32, read_timeout: Duration) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            read_timeout,
        }
    }
}

impl Connect for SerialPortConnector {
    type Port = Box<dyn SerialPort>;

    fn port_name(&self) -> &str {
        self.port_name.as_ref()
    }

    fn connect(&mut self) -> Result<Option<Self::Port>, serialport::Error> {
        match serialport::new(self.port_name.as_ref(), self.baud_rate)
            .timeout(self.read_timeout)
            .open()
        {
            Ok(port) => Ok(Some(port)),
            Err(e) if e.kind() == serialport::ErrorKind::NoDevice => Ok(None),
            Err(e) => Err(e),
        }
    }
}
