//! Parallel ATA bus sniffer capture decoder
//!
//! This library reads the compact capture format written by the ZuluIDE RP2350
//! bus sniffer and turns it into something a human (or a waveform viewer) can
//! read.
//!
//! # Architecture
//!
//! - **TraceDecoder**: Decodes delta-encoded capture words into timestamped [`Sample`]s
//! - **SniffFileSource**: Streams samples lazily from a capture file, block by block
//! - **VcdWriter**: Renders samples as a Value Change Dump, driven by a [`SignalMap`]
//! - **AtaDecoder**: Reconstructs register accesses, commands, data transfers,
//!   status polls and device selection from the sample stream
//! - **AnnotationSink**: Receives the reconstructed [`ProtocolEvent`]s
//!
//! Everything runs single-threaded and pull-based: each stage asks the previous
//! one for the next item, so arbitrarily large captures decode in constant memory.
//!
//! # Example
//!
//! ```no_run
//! use sniff::{AtaDecoder, DecoderConfig, ProtocolEvent, SignalMap, SniffFileSource};
//!
//! let source = SniffFileSource::open("sniff.dat")?;
//! let decoder = AtaDecoder::new(&SignalMap::rp2350(), DecoderConfig::default())?;
//! let mut events: Vec<ProtocolEvent> = Vec::new();
//! decoder.run(source.samples()?, &mut events)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use thiserror::Error;

pub mod nodes;
pub mod runtime;

// Re-export decoder data types
pub use nodes::decoders::{
    AtaDecoder, AtaStateTracker, AtaTables, BusAccess, Category, DecodeStats, DecoderConfig,
    Direction, EventKind, ProtocolEvent, TraceDecoder, TraceEncoder, TraceFormat, labels,
};

// Re-export data types from runtime
pub use runtime::{
    AnnotationSink, EventLog, HostAnnotations, Sample, SampleReceiver, SignalDef, SignalMap,
};

// Re-export file source and waveform writer
pub use nodes::{CaptureSamples, SniffFileSource, VcdConfig, VcdWriter};

#[derive(Error, Debug)]
pub enum SniffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid signal map: {0}")]
    InvalidSignalMap(String),

    #[error("Signal '{0}' is not present in the signal map")]
    MissingSignal(String),

    #[error("Invalid trace format: {0}")]
    InvalidFormat(String),

    #[error("Cannot encode: {0}")]
    Unencodable(String),
}

pub type Result<T> = std::result::Result<T, SniffError>;
