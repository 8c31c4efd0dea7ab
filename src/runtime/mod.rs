//! Runtime support for single-pass, pull-based decoding

pub mod receiver;
pub mod sample;
pub mod signal_map;
pub mod sink;

pub use receiver::SampleReceiver;
pub use sample::Sample;
pub use signal_map::{SignalDef, SignalMap};
pub use sink::{AnnotationSink, EventLog, HostAnnotations};
