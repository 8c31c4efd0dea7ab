//! Capture processing nodes
//!
//! - **Sources** read captures and yield [`Sample`]s (`SniffFileSource`)
//! - **Decoders** turn samples into protocol events (`AtaDecoder`)
//! - **Writers** render samples for waveform viewers (`VcdWriter`)
//!
//! Nodes are chained by iterators: a source is an `Iterator<Item = Sample>`,
//! a decoder consumes one and pushes events into an
//! [`AnnotationSink`](crate::runtime::AnnotationSink).

pub mod decoders;
mod sniff_file;
mod vcd_writer;

// Export file source and waveform writer
pub use sniff_file::{CaptureSamples, DEFAULT_BLOCK_SIZE, SniffFileSource};
pub use vcd_writer::{VcdConfig, VcdWriter};

// Re-export Sample from runtime
pub use crate::runtime::Sample;
