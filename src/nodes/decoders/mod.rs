//! Protocol decoder nodes
//!
//! Capture word codec, the parallel ATA protocol decoder and the types and
//! tables they share.

pub mod ata_decoder;
pub mod ata_state;
pub mod labels;
pub mod tables;
pub mod trace_codec;
pub mod types;

// Re-export common types
pub use labels::labels;
pub use tables::{AtaTables, NameTable};
pub use types::{BusAccess, Category, Direction, EventKind, ProtocolEvent};

// Re-export codec and decoders
pub use ata_decoder::{AtaDecoder, ChannelInfo, DecodeStats, DecoderConfig, channels};
pub use ata_state::AtaStateTracker;
pub use trace_codec::{DecodedSamples, TraceDecoder, TraceEncoder, TraceFormat, words_le};
