//! Core data types for signal processing

use std::fmt;

/// Snapshot of every captured signal line at a specific time
///
/// This is a run-length encoded representation: a new Sample is produced only
/// when at least one line changes, and the vector stays valid until the next
/// Sample arrives. Duration is therefore `next.timestamp - current.timestamp`.
///
/// Bit N of `signals` is the level of the line at bit offset N in the
/// [`SignalMap`](super::SignalMap) that describes the capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sample {
    /// Timestamp in capture ticks when this vector became current
    pub timestamp: u64,
    /// Packed signal levels, LSB = bit offset 0
    pub signals: u64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: u64, signals: u64) -> Self {
        Self { timestamp, signals }
    }

    /// Level of a single line
    #[inline]
    pub fn bit(&self, offset: u32) -> bool {
        (self.signals >> offset) & 1 == 1
    }

    /// Extract a `width`-bit field starting at `offset`
    #[inline]
    pub fn field(&self, offset: u32, width: u32) -> u64 {
        let mask = if width >= 64 {
            u64::MAX
        } else {
            (1u64 << width) - 1
        };
        (self.signals >> offset) & mask
    }

    /// Gather scattered single-bit lines into an integer, LSB first
    pub fn gather(&self, offsets: &[u32]) -> u64 {
        offsets
            .iter()
            .enumerate()
            .fold(0, |acc, (i, &bit)| acc | (u64::from(self.bit(bit)) << i))
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Sample[t={}, v=0x{:07X}]", self.timestamp, self.signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_and_field() {
        let s = Sample::new(10, 0b1011_0110);
        assert!(!s.bit(0));
        assert!(s.bit(1));
        assert!(s.bit(2));
        assert_eq!(s.field(4, 4), 0b1011);
        assert_eq!(s.field(0, 64), 0b1011_0110);
    }

    #[test]
    fn test_gather_scattered_bits() {
        let s = Sample::new(0, (1 << 3) | (1 << 9));
        assert_eq!(s.gather(&[3, 4, 9]), 0b101);
        assert_eq!(s.gather(&[]), 0);
    }

    #[test]
    fn test_display() {
        let s = Sample::new(5, 0x7FF_FFFF);
        assert_eq!(s.to_string(), "Sample[t=5, v=0x7FFFFFF]");
    }
}
