//! In-memory serial port standing in for the microcontroller link, and a
//! log recorder for checking what the worker reports.

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::Arc,
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    Layer, Registry,
};

use crate::Connect;

#[derive(Debug, Default)]
struct Line {
    unread: VecDeque<u8>,
    written: Vec<u8>,
    plugged: bool,
    open: bool,
}

/// Test-side handle: feed bytes in, inspect what the worker wrote.
#[derive(Debug, Clone)]
pub struct MockPort {
    line: Arc<Mutex<Line>>,
}

impl MockPort {
    pub fn new() -> Self {
        Self {
            line: Arc::new(Mutex::new(Line {
                plugged: true,
                ..Default::default()
            })),
        }
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            line: Arc::clone(&self.line),
        }
    }

    pub fn feed(&self, bytes: &[u8]) {
        self.line.lock().unread.extend(bytes);
    }

    pub fn unread(&self) -> usize {
        self.line.lock().unread.len()
    }

    pub fn written(&self) -> Vec<u8> {
        self.line.lock().written.clone()
    }

    pub fn is_closed(&self) -> bool {
        !self.line.lock().open
    }

    pub fn unplug(&self) {
        self.line.lock().plugged = false;
    }

    pub fn replug(&self) {
        self.line.lock().plugged = true;
    }
}

pub struct MockConnector {
    line: Arc<Mutex<Line>>,
}

impl Connect for MockConnector {
    type Port = MockStream;

    fn port_name(&self) -> &str {
        "mock"
    }

    fn connect(&mut self) -> Result<Option<Self::Port>, serialport::Error> {
        let mut line = self.line.lock();

        if !line.plugged {
            return Ok(None);
        }

        line.open = true;

        Ok(Some(MockStream {
            line: Arc::clone(&self.line),
        }))
    }
}

/// The worker's end of the line. Behaves like a port opened with a short
/// read timeout.
pub struct MockStream {
    line: Arc<Mutex<Line>>,
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut line = self.line.lock();

            if !line.plugged {
                return Err(io::ErrorKind::BrokenPipe.into());
            }

            if !line.unread.is_empty() {
                let len = buf.len().min(line.unread.len());
                for (slot, byte) in buf.iter_mut().zip(line.unread.drain(..len)) {
                    *slot = byte;
                }

                return Ok(len);
            }
        }

        thread::sleep(Duration::from_millis(2));

        Err(io::ErrorKind::TimedOut.into())
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut line = self.line.lock();

        if !line.plugged {
            return Err(io::ErrorKind::BrokenPipe.into());
        }

        line.written.extend_from_slice(buf);

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.line.lock().open = false;
    }
}

/// Records the level of every event logged while it is the default
/// subscriber.
#[derive(Debug, Clone, Default)]
pub struct LevelLog {
    levels: Arc<Mutex<Vec<Level>>>,
}

impl LevelLog {
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::subscriber::with_default(Registry::default().with(self.clone()), f)
    }

    pub fn count(&self, level: Level) -> usize {
        self.levels
            .lock()
            .iter()
            .filter(|&&logged| logged == level)
            .count()
    }
}

impl<S: Subscriber> Layer<S> for LevelLog {
    fn on_event(&self, event: &tracing::Event<'_>, _: Context<'_, S>) {
        self.levels.lock().push(*event.metadata().level());
    }
}
