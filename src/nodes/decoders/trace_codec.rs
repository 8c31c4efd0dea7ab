//! Sniffer capture word codec
//!
//! The RP2350 sniffer writes a flat stream of little-endian 32-bit words.
//! Each word packs a delay code in the top bits and a payload in the rest:
//!
//! ```text
//!  31      27 26                                   0
//! +----------+--------------------------------------+
//! |  delay   |  signal snapshot  /  idle extension  |
//! +----------+--------------------------------------+
//! ```
//!
//! - `delay < sentinel`: the payload is a new signal vector, valid after
//!   `tick_unit * (sentinel - delay)` ticks.
//! - `delay == sentinel`: nothing changed; the payload extends the idle time
//!   by `idle_max - payload + idle_bias` units (or `idle_max + idle_bias`
//!   when the payload is at or above `idle_max`).
//!
//! [`TraceDecoder`] turns words into [`Sample`]s, [`TraceEncoder`] does the
//! inverse for synthetic captures.

use tracing::{debug, trace};

use crate::runtime::Sample;
use crate::{Result, SniffError};

/// Parameters of the capture word format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceFormat {
    /// Ticks per delay unit
    pub tick_unit: u64,
    /// Width of the delay code in the top of the word
    pub delay_bits: u32,
    /// Width of the signal / idle payload
    pub payload_bits: u32,
    /// Idle payload at which the idle extension saturates
    pub idle_max: u32,
    /// Constant added to every idle extension
    pub idle_bias: u32,
}

impl TraceFormat {
    /// Format written by the ZuluIDE RP2350 sniffer PIO program
    pub const fn rp2350() -> Self {
        Self {
            tick_unit: 5,
            delay_bits: 5,
            payload_bits: 27,
            idle_max: 0x0007_FFFF,
            idle_bias: 3,
        }
    }

    /// Set the ticks per delay unit (builder pattern)
    pub fn with_tick_unit(mut self, tick_unit: u64) -> Self {
        self.tick_unit = tick_unit;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.delay_bits + self.payload_bits != 32 {
            return Err(SniffError::InvalidFormat(format!(
                "delay ({}) and payload ({}) bits must fill a 32-bit word",
                self.delay_bits, self.payload_bits
            )));
        }
        if !(1..=8).contains(&self.delay_bits) {
            return Err(SniffError::InvalidFormat(format!(
                "delay code width must be 1-8 bits, got {}",
                self.delay_bits
            )));
        }
        if self.tick_unit == 0 {
            return Err(SniffError::InvalidFormat("tick unit must be non-zero".to_string()));
        }
        if self.idle_max == 0 || u64::from(self.idle_max) > self.payload_mask() as u64 {
            return Err(SniffError::InvalidFormat(format!(
                "idle maximum 0x{:X} does not fit the payload",
                self.idle_max
            )));
        }
        Ok(())
    }

    /// Delay code marking an idle extension word
    #[inline]
    pub fn sentinel(&self) -> u32 {
        (1 << self.delay_bits) - 1
    }

    #[inline]
    pub fn payload_mask(&self) -> u32 {
        ((1u64 << self.payload_bits) - 1) as u32
    }

    /// Smallest idle extension in delay units
    pub fn min_idle_units(&self) -> u64 {
        u64::from(self.idle_bias) + 1
    }

    /// Largest idle extension in delay units
    pub fn max_idle_units(&self) -> u64 {
        u64::from(self.idle_max) + u64::from(self.idle_bias)
    }

    /// Split a word into the delay units it covers and, for snapshot words,
    /// the new signal vector.
    #[inline]
    pub fn split(&self, word: u32) -> (u64, Option<u64>) {
        let delay = word >> self.payload_bits;
        let payload = word & self.payload_mask();
        let sentinel = self.sentinel();

        if delay != sentinel {
            (u64::from(sentinel - delay), Some(u64::from(payload)))
        } else if payload < self.idle_max {
            (
                u64::from(self.idle_max - payload) + u64::from(self.idle_bias),
                None,
            )
        } else {
            (self.max_idle_units(), None)
        }
    }
}

impl Default for TraceFormat {
    fn default() -> Self {
        Self::rp2350()
    }
}

/// Stateful capture decoder.
///
/// The running timestamp and last signal vector accumulate across calls, so
/// one instance decodes exactly one capture. Use [`reset`](Self::reset) or a
/// fresh instance for the next one.
#[derive(Debug, Clone)]
pub struct TraceDecoder {
    format: TraceFormat,
    timestamp: u64,
    signals: u64,
    last_emitted: Option<Sample>,
    partial: Vec<u8>,
    words: u64,
}

impl TraceDecoder {
    /// Decoder for the RP2350 sniffer format
    pub fn new() -> Self {
        Self {
            format: TraceFormat::rp2350(),
            timestamp: 0,
            signals: 0,
            last_emitted: None,
            partial: Vec::with_capacity(4),
            words: 0,
        }
    }

    /// Decoder for a custom word format
    pub fn with_format(format: TraceFormat) -> Result<Self> {
        format.validate()?;
        Ok(Self {
            format,
            ..Self::new()
        })
    }

    /// Initialize state at the start of a capture
    pub fn reset(&mut self) {
        self.timestamp = 0;
        self.signals = 0;
        self.last_emitted = None;
        self.partial.clear();
        self.words = 0;
    }

    pub fn format(&self) -> &TraceFormat {
        &self.format
    }

    /// Current running timestamp in ticks
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Number of complete words decoded so far
    pub fn words_decoded(&self) -> u64 {
        self.words
    }

    /// Decode one capture word.
    ///
    /// Returns a sample when the word carries a signal vector that differs
    /// from the last emitted one. Idle extensions only advance time.
    pub fn decode_word(&mut self, word: u32) -> Option<Sample> {
        self.words += 1;
        let (units, snapshot) = self.format.split(word);
        self.timestamp += self.format.tick_unit * units;

        let signals = snapshot?;
        self.signals = signals;

        if let Some(last) = self.last_emitted
            && last.signals == signals
        {
            trace!(
                "Folding repeated vector 0x{:07X} at t={}",
                signals, self.timestamp
            );
            return None;
        }

        let sample = Sample::new(self.timestamp, signals);
        self.last_emitted = Some(sample);
        Some(sample)
    }

    /// Decode a chunk of raw capture bytes, appending samples to `out`.
    ///
    /// A word split across chunk boundaries is carried over to the next call.
    pub fn decode_chunk(&mut self, chunk: &[u8], out: &mut Vec<Sample>) {
        let mut data = chunk;

        if !self.partial.is_empty() {
            let take = (4 - self.partial.len()).min(data.len());
            self.partial.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.partial.len() < 4 {
                return;
            }
            let word = u32::from_le_bytes([
                self.partial[0],
                self.partial[1],
                self.partial[2],
                self.partial[3],
            ]);
            self.partial.clear();
            out.extend(self.decode_word(word));
        }

        let mut words = data.chunks_exact(4);
        for bytes in &mut words {
            let word = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            out.extend(self.decode_word(word));
        }
        self.partial.extend_from_slice(words.remainder());
    }

    /// End of capture.
    ///
    /// Drops an incomplete trailing word (the capture may be cut mid-word)
    /// and returns one trailing sample if time advanced past the last
    /// emitted sample, so consumers see the true end time.
    pub fn finish(&mut self) -> Option<Sample> {
        if !self.partial.is_empty() {
            debug!(
                "Dropping {} bytes of truncated trailing word",
                self.partial.len()
            );
            self.partial.clear();
        }

        let advanced = match self.last_emitted {
            Some(last) => self.timestamp > last.timestamp,
            None => self.timestamp > 0,
        };
        if !advanced {
            return None;
        }

        let sample = Sample::new(self.timestamp, self.signals);
        self.last_emitted = Some(sample);
        Some(sample)
    }

    /// Lazily decode a word sequence with this decoder
    pub fn samples<I>(self, words: I) -> DecodedSamples<I::IntoIter>
    where
        I: IntoIterator<Item = u32>,
    {
        DecodedSamples {
            decoder: self,
            words: words.into_iter(),
            finished: false,
        }
    }

    /// Decode a complete in-memory capture with a fresh RP2350 decoder
    pub fn decode(bytes: &[u8]) -> Vec<Sample> {
        let mut decoder = Self::new();
        let mut out = Vec::with_capacity(bytes.len() / 4 + 1);
        decoder.decode_chunk(bytes, &mut out);
        out.extend(decoder.finish());
        out
    }
}

impl Default for TraceDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy sample sequence over capture words, see [`TraceDecoder::samples`]
pub struct DecodedSamples<I> {
    decoder: TraceDecoder,
    words: I,
    finished: bool,
}

impl<I: Iterator<Item = u32>> Iterator for DecodedSamples<I> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.finished {
            return None;
        }
        for word in self.words.by_ref() {
            if let Some(sample) = self.decoder.decode_word(word) {
                return Some(sample);
            }
        }
        self.finished = true;
        self.decoder.finish()
    }
}

/// Split raw bytes into little-endian words, dropping a truncated tail
pub fn words_le(bytes: &[u8]) -> impl Iterator<Item = u32> + '_ {
    bytes
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Synthetic capture encoder, the inverse of [`TraceDecoder`]
#[derive(Debug, Clone)]
pub struct TraceEncoder {
    format: TraceFormat,
    timestamp: u64,
    last_signals: Option<u64>,
    words: Vec<u32>,
}

impl TraceEncoder {
    pub fn new() -> Self {
        Self {
            format: TraceFormat::rp2350(),
            timestamp: 0,
            last_signals: None,
            words: Vec::new(),
        }
    }

    pub fn with_format(format: TraceFormat) -> Result<Self> {
        format.validate()?;
        Ok(Self {
            format,
            ..Self::new()
        })
    }

    /// Timestamp reached by the words encoded so far
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Encode a new signal vector becoming valid at `timestamp`.
    ///
    /// Timestamps must be multiples of the tick unit and strictly
    /// increasing. A vector equal to the previous one carries no change
    /// and is skipped.
    pub fn push(&mut self, timestamp: u64, signals: u64) -> Result<()> {
        if signals > u64::from(self.format.payload_mask()) {
            return Err(SniffError::Unencodable(format!(
                "vector 0x{:X} wider than {} bits",
                signals, self.format.payload_bits
            )));
        }
        if self.last_signals == Some(signals) {
            return Ok(());
        }
        let units = self.units_until(timestamp)?;
        self.gap(units, signals as u32);
        self.last_signals = Some(signals);
        self.timestamp = timestamp;
        Ok(())
    }

    /// Append the marker the sniffer firmware writes after a DMA overrun:
    /// all lines low, a long pause, all lines high, all lines low, another
    /// pause and an idle word carrying the millisecond clock.
    pub fn push_overflow_marker(&mut self, millis: u32) {
        for word in Self::overflow_marker(millis) {
            let (units, snapshot) = self.format.split(word);
            self.timestamp += self.format.tick_unit * units;
            if let Some(signals) = snapshot {
                self.last_signals = Some(signals);
            }
            self.words.push(word);
        }
    }

    /// Raw overrun marker words in the RP2350 format
    pub const fn overflow_marker(millis: u32) -> [u32; 6] {
        [
            0xF000_0000,
            0xFBFF_8ACF,
            0xF7FF_FFFF,
            0xF000_0000,
            0xFBFF_8ACF,
            0xFC00_0000 | (millis & 0x00FF_FFFF),
        ]
    }

    /// Pad the capture so a decoder ends exactly at `end_timestamp`, and
    /// return the encoded words.
    pub fn finish(mut self, end_timestamp: u64) -> Result<Vec<u32>> {
        if end_timestamp > self.timestamp {
            let units = self.units_until(end_timestamp)?;
            if units >= self.format.min_idle_units() {
                self.idle(units);
            } else {
                // Too short for an idle word: repeat the current vector,
                // which the decoder folds into pure elapsed time
                let signals = self.last_signals.unwrap_or(0) as u32;
                self.snapshot(units, signals);
            }
            self.timestamp = end_timestamp;
        }
        Ok(self.words)
    }

    /// Encode to little-endian bytes
    pub fn finish_bytes(self, end_timestamp: u64) -> Result<Vec<u8>> {
        Ok(self
            .finish(end_timestamp)?
            .into_iter()
            .flat_map(u32::to_le_bytes)
            .collect())
    }

    fn units_until(&self, timestamp: u64) -> Result<u64> {
        let tick = self.format.tick_unit;
        if timestamp <= self.timestamp {
            return Err(SniffError::Unencodable(format!(
                "timestamp {} does not advance past {}",
                timestamp, self.timestamp
            )));
        }
        if timestamp % tick != 0 {
            return Err(SniffError::Unencodable(format!(
                "timestamp {} is not a multiple of the tick unit {}",
                timestamp, tick
            )));
        }
        Ok((timestamp - self.timestamp) / tick)
    }

    /// Cover `units` of elapsed time, ending with a snapshot of `signals`
    fn gap(&mut self, units: u64, signals: u32) {
        let max_snapshot = u64::from(self.format.sentinel());
        if units <= max_snapshot {
            self.snapshot(units, signals);
            return;
        }

        let min_idle = self.format.min_idle_units();
        let last = if units - max_snapshot >= min_idle {
            max_snapshot
        } else {
            units - min_idle
        };
        self.idle(units - last);
        self.snapshot(last, signals);
    }

    fn snapshot(&mut self, units: u64, signals: u32) {
        let delay = self.format.sentinel() - units as u32;
        self.words.push((delay << self.format.payload_bits) | signals);
    }

    fn idle(&mut self, mut units: u64) {
        let min_idle = self.format.min_idle_units();
        let max_idle = self.format.max_idle_units();
        let sentinel = self.format.sentinel() << self.format.payload_bits;

        while units > 0 {
            let step = if units <= max_idle {
                units
            } else if units - max_idle < min_idle {
                units - min_idle
            } else {
                max_idle
            };
            let payload = (max_idle - step) as u32;
            self.words.push(sentinel | payload);
            units -= step;
        }
    }
}

impl Default for TraceEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn test_snapshot_word() {
        let mut decoder = TraceDecoder::new();
        // delay 30 -> one unit of 5 ticks
        let sample = decoder.decode_word((30 << 27) | 0x123).unwrap();
        assert_eq!(sample, Sample::new(5, 0x123));
        // delay 0 -> 31 units
        let sample = decoder.decode_word(0x456).unwrap();
        assert_eq!(sample, Sample::new(5 + 155, 0x456));
    }

    #[test]
    fn test_idle_word_advances_without_emitting() {
        let mut decoder = TraceDecoder::new();
        decoder.decode_word((30 << 27) | 1);
        assert_eq!(decoder.decode_word((31 << 27) | 0x7FFFE), None);
        assert_eq!(decoder.timestamp(), 5 + 5 * 4);
        assert_eq!(decoder.decode_word(0xFFFF_FFFF), None);
        assert_eq!(decoder.timestamp(), 25 + 5 * 0x80002);
    }

    #[test]
    fn test_trailing_sample_after_idle_only_capture() {
        // A single saturated idle word followed by end of input
        let samples = TraceDecoder::decode(&bytes(&[(31 << 27) | 0x7FFFD]));
        assert_eq!(samples, vec![Sample::new(5 * (2 + 3), 0)]);

        let samples = TraceDecoder::decode(&bytes(&[(31 << 27) | 0x3]));
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].timestamp, 5 * (0x7FFFF - 3 + 3));
    }

    #[test]
    fn test_no_trailing_sample_when_last_word_is_snapshot() {
        let samples = TraceDecoder::decode(&bytes(&[(30 << 27) | 1, (29 << 27) | 2]));
        assert_eq!(samples, vec![Sample::new(5, 1), Sample::new(15, 2)]);
    }

    #[test]
    fn test_trailing_sample_carries_last_vector() {
        let samples = TraceDecoder::decode(&bytes(&[(30 << 27) | 7, (31 << 27) | 0x7FFFE]));
        assert_eq!(samples, vec![Sample::new(5, 7), Sample::new(25, 7)]);
    }

    #[test]
    fn test_repeated_vector_is_folded() {
        let samples = TraceDecoder::decode(&bytes(&[
            (30 << 27) | 9,
            (30 << 27) | 9,
            (30 << 27) | 3,
        ]));
        assert_eq!(samples, vec![Sample::new(5, 9), Sample::new(15, 3)]);
    }

    #[test]
    fn test_first_zero_vector_is_emitted() {
        let samples = TraceDecoder::decode(&bytes(&[30 << 27]));
        assert_eq!(samples, vec![Sample::new(5, 0)]);
    }

    #[test]
    fn test_truncated_tail_dropped() {
        let mut data = bytes(&[(30 << 27) | 1]);
        data.extend_from_slice(&[0xAA, 0xBB]);
        assert_eq!(TraceDecoder::decode(&data), vec![Sample::new(5, 1)]);
    }

    #[test]
    fn test_chunk_boundaries_inside_words() {
        let words = [(30 << 27) | 1, (31 << 27) | 0x7FFF0, (20 << 27) | 2, (29 << 27) | 3];
        let data = bytes(&words);
        let expected = TraceDecoder::decode(&data);

        for chunk_size in [1, 3, 5, 7] {
            let mut decoder = TraceDecoder::new();
            let mut out = Vec::new();
            for chunk in data.chunks(chunk_size) {
                decoder.decode_chunk(chunk, &mut out);
            }
            out.extend(decoder.finish());
            assert_eq!(out, expected, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_decode_is_deterministic_across_instances() {
        let data = bytes(&TraceEncoder::overflow_marker(1234));
        assert_eq!(TraceDecoder::decode(&data), TraceDecoder::decode(&data));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut decoder = TraceDecoder::new();
        let mut out = Vec::new();
        decoder.decode_chunk(&bytes(&[(30 << 27) | 1]), &mut out);
        decoder.decode_chunk(&[1, 2], &mut out);
        decoder.reset();
        assert_eq!(decoder.timestamp(), 0);
        assert_eq!(decoder.words_decoded(), 0);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut decoder = TraceDecoder::new();
        decoder.decode_word((31 << 27) | 0x7FFFE);
        assert!(decoder.finish().is_some());
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_lazy_samples_match_eager_decode() {
        let words = [(30 << 27) | 1, (31 << 27) | 0x10, (0 << 27) | 2, (31 << 27) | 0x7FFFE];
        let data = bytes(&words);
        let lazy: Vec<Sample> = TraceDecoder::new().samples(words_le(&data)).collect();
        assert_eq!(lazy, TraceDecoder::decode(&data));
        assert_eq!(lazy.last().map(|s| s.signals), Some(2));
    }

    #[test]
    fn test_encoder_roundtrip_with_long_gaps() {
        let input = [
            (5, 0x1),
            (10, 0x2),
            (10 + 5 * 31, 0x3),
            (10 + 5 * 31 + 5 * 33, 0x4),
            (1_000_000, 0x5),
            (1_000_000 + 5 * 0x80002 + 5 * 31 + 5, 0x6),
            (50_000_000, 0x7FF_FFFF),
        ];
        let mut encoder = TraceEncoder::new();
        for &(t, v) in &input {
            encoder.push(t, v).unwrap();
        }
        let data = encoder.finish_bytes(60_000_000).unwrap();

        let samples = TraceDecoder::decode(&data);
        let expected: Vec<Sample> = input
            .iter()
            .map(|&(t, v)| Sample::new(t, v))
            .chain([Sample::new(60_000_000, 0x7FF_FFFF)])
            .collect();
        assert_eq!(samples, expected);
    }

    #[test]
    fn test_encoder_short_tail() {
        let mut encoder = TraceEncoder::new();
        encoder.push(5, 3).unwrap();
        let data = encoder.finish_bytes(15).unwrap();
        assert_eq!(
            TraceDecoder::decode(&data),
            vec![Sample::new(5, 3), Sample::new(15, 3)]
        );
    }

    #[test]
    fn test_encoder_rejects_bad_timestamps() {
        let mut encoder = TraceEncoder::new();
        encoder.push(10, 1).unwrap();
        assert!(matches!(
            encoder.push(10, 2),
            Err(SniffError::Unencodable(_))
        ));
        assert!(encoder.push(12, 2).is_err());
        assert!(encoder.push(15, 1 << 27).is_err());
    }

    #[test]
    fn test_overflow_marker_decodes_to_low_high_low() {
        let mut encoder = TraceEncoder::new();
        encoder.push(5, 0x3).unwrap();
        encoder.push_overflow_marker(42);
        let end = encoder.timestamp();
        let samples = TraceDecoder::decode(&encoder.finish_bytes(end).unwrap());

        let vectors: Vec<u64> = samples.iter().map(|s| s.signals).collect();
        assert_eq!(vectors, vec![0x3, 0x0, 0x7FF_FFFF, 0x0, 0x0]);
        assert_eq!(samples.last().map(|s| s.timestamp), Some(end));
    }

    #[test]
    fn test_custom_format_validation() {
        let decoder = TraceDecoder::with_format(TraceFormat::rp2350().with_tick_unit(1)).unwrap();
        assert_eq!(decoder.format().tick_unit, 1);
        assert_eq!(decoder.format().payload_bits, 27);
        assert!(TraceDecoder::with_format(TraceFormat::rp2350().with_tick_unit(0)).is_err());
        let bad = TraceFormat {
            delay_bits: 4,
            ..TraceFormat::rp2350()
        };
        assert!(bad.validate().is_err());
    }
}
