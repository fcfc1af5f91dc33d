use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::codec::{ByteReader, ByteWriter, DecodeError, Wire};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Tick(pub u32);

impl Tick {
    /// The state carried by an init event.
    pub const BASELINE: Tick = Tick(0);

    pub fn next(self) -> Tick {
        Tick(self.0.wrapping_add(1))
    }

    /// How far `self` is ahead of `other`, saturating at zero.
    pub fn distance_from(self, other: Tick) -> u32 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick {}", self.0)
    }
}

impl Wire for Tick {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u32(self.0);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_u32().map(Self)
    }
}

/// Wall-clock capture time in 100 ns units since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TickTime(pub u64);

impl TickTime {
    const UNITS_PER_SECOND: u64 = 10_000_000;

    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(Self(0), Self::from_duration)
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self((duration.as_nanos() / 100) as u64)
    }

    pub fn as_duration(self) -> Duration {
        Duration::new(
            self.0 / Self::UNITS_PER_SECOND,
            ((self.0 % Self::UNITS_PER_SECOND) * 100) as u32,
        )
    }
}

impl fmt::Display for TickTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}s", self.as_duration().as_secs_f64())
    }
}

impl Wire for TickTime {
    fn encode(&self, writer: &mut ByteWriter) {
        writer.write_u64(self.0);
    }

    fn decode(reader: &mut ByteReader<'_>) -> Result<Self, DecodeError> {
        reader.read_u64().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_time_uses_100ns_units() {
        let time = TickTime::from_duration(Duration::from_micros(1));
        assert_eq!(time, TickTime(10));
        assert_eq!(TickTime(15_000_000).as_duration(), Duration::from_millis(1500));
    }

    #[test]
    fn now_is_after_2020() {
        assert!(TickTime::now().as_duration().as_secs() > 1_577_836_800);
    }
}
