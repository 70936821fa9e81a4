use std::fmt::{self, Display};

/// Microcontroller clock reading, in microseconds since it booted.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Timestamp {
    micros: i64,
}

impl Timestamp {
    pub const fn from_micros(micros: i64) -> Self {
        Self { micros }
    }

    pub const fn millis(&self) -> i64 {
        self.micros.rem_euclid(1_000_000) / 1_000
    }

    pub const fn seconds(&self) -> i64 {
        self.micros.div_euclid(1_000_000).rem_euclid(60)
    }

    pub const fn minutes(&self) -> i64 {
        self.micros.div_euclid(60_000_000)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let millis = self.millis();
        let seconds = self.seconds();
        let minutes = self.minutes();

        write!(f, "{minutes:02}:{seconds:02}.{millis:03}")
    }
}
