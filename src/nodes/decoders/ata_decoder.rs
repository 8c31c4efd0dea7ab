//! Parallel ATA protocol decoder
//!
//! Pulls [`Sample`]s, turns strobe pulses into [`BusAccess`]es and feeds them
//! to an [`AtaStateTracker`]. Finished events go to an [`AnnotationSink`].
//!
//! The decoder only wakes up on edges of DIOW, DIOR and D15. At every wake-up
//! the bus is classified, in this order:
//!
//! 1. Both strobes low with every address and data line low: the sniffer
//!    inserted an overflow marker. The anomaly lasts until a strobe rises.
//! 2. Both strobes high, DATA_SEL high and a data bus other than `0xFFFF`
//!    held only briefly: a control mux write.
//! 3. DIOW low: a register write, latched on the last state before DIOW rises.
//! 4. DIOR low: a register read, latched the same way on DIOR.

use tracing::{debug, info, trace};

use super::ata_state::AtaStateTracker;
use super::tables::{AtaTables, REG_DATA};
use super::types::{BusAccess, Direction, EventKind, ProtocolEvent};
use crate::runtime::{AnnotationSink, Sample, SampleReceiver, SignalMap};
use crate::{Result, SniffError};

/// Tunables of the ATA decoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// A DATA_SEL pulse shorter than this many ticks is a control mux write
    pub ctrl_mux_max_duration: u64,
    /// Length of an emitted control mux annotation, in ticks
    pub ctrl_mux_span: u64,
    pub tables: AtaTables,
}

impl DecoderConfig {
    pub fn with_ctrl_mux_threshold(mut self, ticks: u64) -> Self {
        self.ctrl_mux_max_duration = ticks;
        self
    }

    pub fn with_ctrl_mux_span(mut self, ticks: u64) -> Self {
        self.ctrl_mux_span = ticks;
        self
    }

    pub fn with_tables(mut self, tables: AtaTables) -> Self {
        self.tables = tables;
        self
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            ctrl_mux_max_duration: 25,
            ctrl_mux_span: 50,
            tables: AtaTables::default(),
        }
    }
}

/// Logic analyzer channel declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub desc: String,
}

impl ChannelInfo {
    fn new(id: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }
}

/// Channels the decoder needs, in the order a host should declare them.
/// Names match the lines of [`SignalMap::rp2350`].
pub fn channels() -> Vec<ChannelInfo> {
    let mut channels = vec![
        ChannelInfo::new("iow", "DIOW", "I/O write strobe, active low"),
        ChannelInfo::new("ior", "DIOR", "I/O read strobe, active low"),
        ChannelInfo::new("da0", "DA0", "Address bit 0"),
        ChannelInfo::new("da1", "DA1", "Address bit 1"),
        ChannelInfo::new("da2", "DA2", "Address bit 2"),
        ChannelInfo::new("cs0", "CS0", "Chip select 0, active low"),
        ChannelInfo::new("cs1", "CS1", "Chip select 1, active low"),
    ];
    channels.extend((0..16).map(|i| {
        ChannelInfo::new(format!("d{}", i), format!("D{}", i), format!("Data bit {}", i))
    }));
    channels.push(ChannelInfo::new(
        "data_sel",
        "DATA_SEL",
        "Data bus routed to the control mux",
    ));
    channels
}

/// Bit offsets of the lines the decoder reads
#[derive(Debug, Clone, PartialEq, Eq)]
struct BusLines {
    iow: u32,
    ior: u32,
    /// DA0, DA1, DA2, CS0, CS1
    address: [u32; 5],
    data: [u32; 16],
    data_sel: Option<u32>,
}

impl BusLines {
    fn resolve(map: &SignalMap) -> Result<Self> {
        let line = |name: &str, bus: &str, index: u32| {
            map.locate(name, bus, index)
                .ok_or_else(|| SniffError::MissingSignal(name.to_string()))
        };

        let mut data = [0u32; 16];
        for (i, bit) in data.iter_mut().enumerate() {
            *bit = line(&format!("D{}", i), "DATA", i as u32)?;
        }

        Ok(Self {
            iow: line("DIOW", "DIOW", 0)?,
            ior: line("DIOR", "DIOR", 0)?,
            address: [
                line("DA0", "DA", 0)?,
                line("DA1", "DA", 1)?,
                line("DA2", "DA", 2)?,
                line("CS0", "CS0", 0)?,
                line("CS1", "CS1", 0)?,
            ],
            data,
            data_sel: map.locate("DATA_SEL", "DATA_SEL", 0),
        })
    }

    /// Lines whose edges wake the decoder
    fn watch_mask(&self) -> u64 {
        (1 << self.iow) | (1 << self.ior) | (1 << self.data[15])
    }

    /// Every strobe, address and data line
    fn bus_mask(&self) -> u64 {
        self.address
            .iter()
            .chain(self.data.iter())
            .fold((1 << self.iow) | (1 << self.ior), |mask, &bit| mask | (1 << bit))
    }

    fn address(&self, sample: &Sample) -> u8 {
        sample.gather(&self.address) as u8
    }

    fn data(&self, sample: &Sample) -> u16 {
        sample.gather(&self.data) as u16
    }
}

/// Counters reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Completed strobe pulses
    pub accesses: u64,
    /// Strobe pulses cut off by the end of the capture
    pub truncated_accesses: u64,
    pub overflows: u64,
    pub ctrl_mux_writes: u64,
    /// Events handed to the sink
    pub events: u64,
    /// Timestamp of the last sample seen
    pub end_timestamp: u64,
}

/// Parallel ATA decoder over a sample stream
pub struct AtaDecoder {
    name: String,
    lines: BusLines,
    ctrl_mux_max_duration: u64,
    ctrl_mux_span: u64,
    tracker: AtaStateTracker,
    emitted: Vec<ProtocolEvent>,
    stats: DecodeStats,
}

impl AtaDecoder {
    /// Create a decoder reading the lines named in `map`
    ///
    /// Fails with [`SniffError::MissingSignal`] if a strobe, address or data
    /// line cannot be found. DATA_SEL is optional; without it no control mux
    /// writes are reported.
    pub fn new(map: &SignalMap, config: DecoderConfig) -> Result<Self> {
        let lines = BusLines::resolve(map)?;
        debug!(
            "AtaDecoder lines: iow={} ior={} address={:?} data_sel={:?}",
            lines.iow, lines.ior, lines.address, lines.data_sel
        );
        Ok(Self {
            name: "ata_decoder".to_string(),
            lines,
            ctrl_mux_max_duration: config.ctrl_mux_max_duration,
            ctrl_mux_span: config.ctrl_mux_span,
            tracker: AtaStateTracker::new(config.tables),
            emitted: Vec::new(),
            stats: DecodeStats::default(),
        })
    }

    /// With custom name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decode `samples` to the end, handing every event to `sink`.
    ///
    /// Returns the first error raised by the sink.
    pub fn run<I, S>(mut self, samples: I, mut sink: S) -> Result<DecodeStats>
    where
        I: IntoIterator<Item = Sample>,
        S: AnnotationSink,
    {
        let mut rx = SampleReceiver::new(samples.into_iter());
        let watch = self.lines.watch_mask();
        let bus = self.lines.bus_mask();

        while let Some(sample) = rx.wait(watch) {
            let iow = sample.bit(self.lines.iow);
            let ior = sample.bit(self.lines.ior);

            if !iow && !ior && sample.signals & bus == 0 {
                self.capture_overflow(&mut rx, &sample);
            } else if iow && ior {
                self.control_mux(&mut rx, &sample);
            } else if !iow {
                self.strobe(&mut rx, sample, Direction::Write);
            } else {
                self.strobe(&mut rx, sample, Direction::Read);
            }
            self.drain(&mut sink)?;
        }

        self.stats.end_timestamp = rx.last_timestamp();
        self.tracker
            .finish(self.stats.end_timestamp, &mut self.emitted);
        self.drain(&mut sink)?;

        info!(
            "{}: {} accesses, {} events, {} overflows, {} control mux writes",
            self.name,
            self.stats.accesses,
            self.stats.events,
            self.stats.overflows,
            self.stats.ctrl_mux_writes
        );
        Ok(self.stats)
    }

    /// Decode into a vector
    pub fn decode<I>(self, samples: I) -> Result<Vec<ProtocolEvent>>
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut events: Vec<ProtocolEvent> = Vec::new();
        self.run(samples, &mut events)?;
        Ok(events)
    }

    fn drain<S: AnnotationSink>(&mut self, sink: &mut S) -> Result<()> {
        for event in self.emitted.drain(..) {
            self.stats.events += 1;
            sink.annotate(event)?;
        }
        Ok(())
    }

    fn capture_overflow<I>(&mut self, rx: &mut SampleReceiver<I>, first: &Sample)
    where
        I: Iterator<Item = Sample>,
    {
        let watch = self.lines.watch_mask();
        let end = loop {
            match rx.wait(watch) {
                Some(next) if next.bit(self.lines.iow) || next.bit(self.lines.ior) => {
                    break next.timestamp;
                }
                Some(_) => continue,
                None => break rx.last_timestamp(),
            }
        };
        debug!("Capture overflow from {} to {}", first.timestamp, end);
        self.stats.overflows += 1;
        self.emitted.push(ProtocolEvent::new(
            first.timestamp,
            end,
            EventKind::CaptureOverflow,
        ));
    }

    fn control_mux<I>(&mut self, rx: &mut SampleReceiver<I>, sample: &Sample)
    where
        I: Iterator<Item = Sample>,
    {
        let Some(data_sel) = self.lines.data_sel else {
            return;
        };
        let value = self.lines.data(sample);
        if !sample.bit(data_sel) || value == 0xFFFF {
            return;
        }

        // Held until the next sample of any kind, or zero ticks at the end
        let held = rx
            .peek()
            .map_or(0, |next| next.timestamp - sample.timestamp);
        if held >= self.ctrl_mux_max_duration {
            return;
        }

        trace!("Control mux write 0x{:04X} at {}", value, sample.timestamp);
        self.stats.ctrl_mux_writes += 1;
        self.emitted.push(ProtocolEvent::new(
            sample.timestamp,
            sample.timestamp + self.ctrl_mux_span,
            EventKind::ControlMuxWrite { value },
        ));
    }

    /// Follow a low strobe until it rises, then report the access
    fn strobe<I>(&mut self, rx: &mut SampleReceiver<I>, first: Sample, direction: Direction)
    where
        I: Iterator<Item = Sample>,
    {
        let strobe = match direction {
            Direction::Write => self.lines.iow,
            Direction::Read => self.lines.ior,
        };

        let mut latched = first;
        let end = loop {
            match rx.recv() {
                Some(next) if next.bit(strobe) => break next.timestamp,
                Some(next) => latched = next,
                None => {
                    debug!(
                        "Capture ended during {} strobe started at {}",
                        direction, first.timestamp
                    );
                    self.stats.truncated_accesses += 1;
                    return;
                }
            }
        };

        let address = self.lines.address(&latched);
        let data = self.lines.data(&latched);
        let value = if address == REG_DATA { data } else { data & 0xFF };
        let access = BusAccess::new(first.timestamp, end, direction, address, value);
        trace!(
            "{} access 0x{:02X} = 0x{:04X} [{}..{}]",
            direction, address, value, access.start, access.end
        );
        self.process_access(&access);
    }

    /// Report one access and advance the protocol state
    fn process_access(&mut self, access: &BusAccess) {
        self.stats.accesses += 1;
        self.emitted.push(self.tracker.describe(access));
        self.tracker.process(access, &mut self.emitted);
    }
}
