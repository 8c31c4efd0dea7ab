//! Value Change Dump output
//!
//! Renders a sample stream as a VCD file PulseView or GTKWave can open. A
//! [`SignalMap`] decides how the signal vector is split into named wires.

use std::io::Write;

use tracing::debug;

use crate::runtime::{Sample, SignalMap};
use crate::{Result, SniffError};

/// VCD header parameters
#[derive(Debug, Clone, PartialEq)]
pub struct VcdConfig {
    /// Ticks per VCD time unit
    pub divider: u64,
    /// Capture clock, used to derive the timescale
    pub cpu_frequency_hz: f64,
    /// `$version` text
    pub version: String,
}

impl VcdConfig {
    /// Settings for the ZuluIDE RP2350 sniffer: 150 MHz clock, one VCD time
    /// unit per five ticks
    pub fn rp2350() -> Self {
        Self {
            divider: 5,
            cpu_frequency_hz: 150e6,
            version: "ZuluIDE RP2350 Sniffer".to_string(),
        }
    }

    pub fn with_divider(mut self, divider: u64) -> Self {
        self.divider = divider;
        self
    }

    pub fn with_cpu_frequency(mut self, hz: f64) -> Self {
        self.cpu_frequency_hz = hz;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Reject settings that give no usable timescale
    pub fn validate(&self) -> Result<()> {
        if self.divider == 0 {
            return Err(SniffError::InvalidFormat(
                "VCD divider must be at least 1".to_string(),
            ));
        }
        if !self.cpu_frequency_hz.is_finite() || self.cpu_frequency_hz <= 0.0 {
            return Err(SniffError::InvalidFormat(format!(
                "CPU frequency must be a positive number of Hz, got {}",
                self.cpu_frequency_hz
            )));
        }
        let picoseconds = self.divider as f64 / self.cpu_frequency_hz * 1e12;
        if picoseconds.round() < 1.0 || picoseconds >= u64::MAX as f64 {
            return Err(SniffError::InvalidFormat(format!(
                "timescale of {} ps cannot be written",
                picoseconds
            )));
        }
        Ok(())
    }

    /// Length of one VCD time unit, e.g. `33333ps`
    pub fn timescale(&self) -> String {
        let picoseconds = self.divider as f64 / self.cpu_frequency_hz * 1e12;
        format!("{}ps", picoseconds.round() as u64)
    }
}

impl Default for VcdConfig {
    fn default() -> Self {
        Self::rp2350()
    }
}

/// Streaming VCD writer
///
/// The header is written before the first sample, or explicitly with
/// [`write_header`](Self::write_header). Each sample becomes one line with
/// the time marker followed by every signal's value.
pub struct VcdWriter<W: Write> {
    writer: W,
    map: SignalMap,
    config: VcdConfig,
    header_written: bool,
    samples_written: u64,
    line: String,
}

impl<W: Write> VcdWriter<W> {
    /// Fails with [`SniffError::InvalidFormat`] if `config` does not validate
    pub fn new(writer: W, map: SignalMap, config: VcdConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            writer,
            map,
            config,
            header_written: false,
            samples_written: 0,
            line: String::with_capacity(256),
        })
    }

    /// Number of value change lines written
    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    pub fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        writeln!(self.writer, "$version {} $end", self.config.version)?;
        writeln!(self.writer, "$timescale {} $end", self.config.timescale())?;
        writeln!(self.writer, "$scope module ide $end")?;
        for signal in self.map.signals() {
            writeln!(
                self.writer,
                "$var wire {} {} {} $end",
                signal.width, signal.symbol, signal.name
            )?;
        }
        writeln!(self.writer, "$upscope $end")?;
        writeln!(self.writer, "$enddefinitions $end")?;
        writeln!(self.writer)?;
        self.header_written = true;
        debug!(
            "VCD header: {} signals, timescale {}",
            self.map.signals().len(),
            self.config.timescale()
        );
        Ok(())
    }

    pub fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        use std::fmt::Write as _;

        self.write_header()?;

        self.line.clear();
        // Writing into a String cannot fail
        let _ = write!(self.line, "#{}", sample.timestamp / self.config.divider);
        for signal in self.map.signals() {
            let value = sample.field(signal.bit, signal.width);
            if signal.width == 1 {
                let _ = write!(self.line, " {}{}", value, signal.symbol);
            } else {
                let _ = write!(
                    self.line,
                    " b{:0width$b} {}",
                    value,
                    signal.symbol,
                    width = signal.width as usize
                );
            }
        }
        self.line.push('\n');
        self.writer.write_all(self.line.as_bytes())?;
        self.samples_written += 1;
        Ok(())
    }

    /// Write every sample from `samples`, returning how many were written
    pub fn write_all<I>(&mut self, samples: I) -> Result<u64>
    where
        I: IntoIterator<Item = Sample>,
    {
        let before = self.samples_written;
        for sample in samples {
            self.write_sample(&sample)?;
        }
        Ok(self.samples_written - before)
    }

    /// Flush and return the underlying writer. An empty dump still gets a
    /// header.
    pub fn finish(mut self) -> Result<W> {
        self.write_header()?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::SignalDef;

    fn render(map: SignalMap, samples: &[Sample]) -> String {
        let mut writer = VcdWriter::new(Vec::new(), map, VcdConfig::default()).unwrap();
        writer.write_all(samples.iter().copied()).unwrap();
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_timescale() {
        assert_eq!(VcdConfig::default().timescale(), "33333ps");
        assert_eq!(
            VcdConfig::default().with_divider(1).timescale(),
            "6667ps"
        );
        assert_eq!(
            VcdConfig::default()
                .with_divider(10)
                .with_cpu_frequency(100e6)
                .timescale(),
            "100000ps"
        );
    }

    #[test]
    fn test_invalid_timescale_is_rejected() {
        for config in [
            VcdConfig::default().with_divider(0),
            VcdConfig::default().with_cpu_frequency(0.0),
            VcdConfig::default().with_cpu_frequency(-150e6),
            VcdConfig::default().with_cpu_frequency(f64::NAN),
            VcdConfig::default().with_cpu_frequency(f64::INFINITY),
            VcdConfig::default().with_cpu_frequency(1e-9),
        ] {
            assert!(
                matches!(config.validate(), Err(SniffError::InvalidFormat(_))),
                "{:?}",
                config
            );
            assert!(VcdWriter::new(Vec::new(), SignalMap::rp2350(), config).is_err());
        }
        assert!(VcdConfig::default().validate().is_ok());
    }

    #[test]
    fn test_custom_version() {
        let config = VcdConfig::default().with_version("bench rig 2");
        let mut writer = VcdWriter::new(Vec::new(), SignalMap::rp2350(), config).unwrap();
        writer.write_header().unwrap();
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(text.lines().next(), Some("$version bench rig 2 $end"));
    }

    #[test]
    fn test_header() {
        let text = render(SignalMap::rp2350(), &[]);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "$version ZuluIDE RP2350 Sniffer $end");
        assert_eq!(lines[1], "$timescale 33333ps $end");
        assert_eq!(lines[2], "$scope module ide $end");
        assert_eq!(lines[3], "$var wire 1 W DIOW $end");
        assert!(lines.contains(&"$var wire 1 d15 D15 $end"));
        assert!(text.ends_with("$upscope $end\n$enddefinitions $end\n\n"));
    }

    #[test]
    fn test_single_bit_values() {
        let map = SignalMap::new(vec![
            SignalDef::new(0, 1, "DIOW", "W"),
            SignalDef::new(1, 1, "DIOR", "R"),
        ])
        .unwrap();
        let text = render(map, &[Sample::new(0, 0b10), Sample::new(15, 0b01)]);
        let body: Vec<&str> = text.split("\n\n").nth(1).unwrap().lines().collect();
        assert_eq!(body, vec!["#0 0W 1R", "#3 1W 0R"]);
    }

    #[test]
    fn test_bus_values_are_zero_padded() {
        let text = render(
            SignalMap::rp2350_grouped(),
            &[Sample::new(500, (0b101 << 2) | (0x00F0 << 8) | 0b11)],
        );
        let line = text.lines().last().unwrap();
        assert!(line.starts_with("#100 1W 1R b101 A 0c 0C 0D b0000000011110000 d "));
        assert!(line.ends_with(" 0s 0r 0i"));
    }

    #[test]
    fn test_samples_written() {
        let mut writer =
            VcdWriter::new(Vec::new(), SignalMap::rp2350(), VcdConfig::default()).unwrap();
        assert_eq!(
            writer
                .write_all(vec![Sample::new(0, 1), Sample::new(5, 2)])
                .unwrap(),
            2
        );
        writer.write_sample(&Sample::new(10, 3)).unwrap();
        assert_eq!(writer.samples_written(), 3);
    }
}
