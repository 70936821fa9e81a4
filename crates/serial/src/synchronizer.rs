//! Marker-anchored frame extraction from the raw serial byte stream.
//!
//! The stream is scanned one byte at a time for [`MARKER`]; once both marker
//! bytes have been seen, exactly [`BODY_LEN`] bytes are read and handed to
//! the checksum. A body that fails its checksum is dropped whole, and the
//! bytes inside it are not searched for another marker, so a corrupted
//! frame can cost the frame that follows it as well.

use std::{
    io::{self, Read},
    mem,
};

use rover_telemetry::{
    frame::{BODY_LEN, FRAME_LEN, MARKER},
    TelemetryPacket,
};
use tracing::warn;

use crate::error::{FrameReadError, FramingError, TransportError};

/// Noise bytes tolerated per call before giving up with
/// [`FramingError::MarkerNotFound`]. Keeps the worker loop turning (and its
/// command queue drained) even if the line is nothing but garbage.
const MAX_SKIP_PER_READ: usize = 8 * FRAME_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    SeekMarker1,
    SeekMarker2,
}

#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    state: SyncState,
    skipped: usize,
}

impl FrameSynchronizer {
    pub fn new() -> Self {
        Self {
            state: SyncState::SeekMarker1,
            skipped: 0,
        }
    }

    /// Read until one frame has been extracted and checked.
    ///
    /// Timeouts while hunting for the marker keep the marker progress, so the
    /// next call carries on where this one stopped. A timeout inside the body
    /// throws the partial body away.
    pub fn read_frame<R: Read + ?Sized>(
        &mut self,
        reader: &mut R,
    ) -> Result<TelemetryPacket, FrameReadError> {
        self.seek_marker(reader)?;

        let body = self.read_body(reader)?;

        Ok(TelemetryPacket::decode(&body)?)
    }

    fn seek_marker<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<(), FrameReadError> {
        let mut examined = 0;

        loop {
            let byte = read_byte(reader)?;
            examined += 1;

            self.state = match (self.state, byte) {
                (SyncState::SeekMarker1, byte) if byte == MARKER[0] => SyncState::SeekMarker2,
                (SyncState::SeekMarker2, byte) if byte == MARKER[1] => {
                    if self.skipped > 0 {
                        warn!(skipped = self.skipped, "resynchronized on frame marker");
                        self.skipped = 0;
                    }

                    self.state = SyncState::SeekMarker1;

                    return Ok(());
                }
                // The stray first marker byte is noise, but this byte may
                // itself start the next marker
                (SyncState::SeekMarker2, byte) => {
                    self.skipped += 1;

                    if byte == MARKER[0] {
                        SyncState::SeekMarker2
                    } else {
                        self.skipped += 1;
                        SyncState::SeekMarker1
                    }
                }
                (SyncState::SeekMarker1, _) => {
                    self.skipped += 1;
                    SyncState::SeekMarker1
                }
            };

            if examined >= MAX_SKIP_PER_READ {
                return Err(FramingError::MarkerNotFound {
                    skipped: mem::take(&mut self.skipped),
                }
                .into());
            }
        }
    }

    fn read_body<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<[u8; BODY_LEN], FrameReadError> {
        let mut body = [0u8; BODY_LEN];
        let mut got = 0;

        while got < BODY_LEN {
            match reader.read(&mut body[got..]) {
                Ok(0) => {
                    return Err(FramingError::Truncated {
                        got,
                        expected: BODY_LEN,
                    }
                    .into())
                }
                Ok(n) => got += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    return Err(match TransportError::from(e) {
                        TransportError::TimedOut => FramingError::Truncated {
                            got,
                            expected: BODY_LEN,
                        }
                        .into(),
                        error => error.into(),
                    })
                }
            }
        }

        Ok(body)
    }
}

fn read_byte<R: Read + ?Sized>(reader: &mut R) -> Result<u8, TransportError> {
    let mut byte = [0u8; 1];

    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Err(TransportError::SerialPortDisconnected),
            Ok(_) => return Ok(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
}
