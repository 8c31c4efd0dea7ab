//! Annotation sinks for reconstructed protocol events
//!
//! Decoders hand every finished [`ProtocolEvent`] to an [`AnnotationSink`].
//! The sink decides what an annotation means: an in-memory list, a text log,
//! or the annotation output of a logic analyzer host.

use std::io::Write;

use crate::Result;
use crate::nodes::decoders::{ProtocolEvent, labels};

/// Consumer of emitted protocol events
pub trait AnnotationSink {
    /// Receive one finished event. Events arrive in emission order.
    fn annotate(&mut self, event: ProtocolEvent) -> Result<()>;
}

impl AnnotationSink for Vec<ProtocolEvent> {
    fn annotate(&mut self, event: ProtocolEvent) -> Result<()> {
        self.push(event);
        Ok(())
    }
}

impl<S: AnnotationSink + ?Sized> AnnotationSink for &mut S {
    fn annotate(&mut self, event: ProtocolEvent) -> Result<()> {
        (**self).annotate(event)
    }
}

/// Text event log, one line per event: `<start>..<end> <category> <label>`
pub struct EventLog<W: Write> {
    writer: W,
    count: u64,
}

impl<W: Write> EventLog<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, count: 0 }
    }

    /// Number of events written so far
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Flush and return the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> AnnotationSink for EventLog<W> {
    fn annotate(&mut self, event: ProtocolEvent) -> Result<()> {
        let texts = labels(&event);
        writeln!(
            self.writer,
            "{}..{} {} {}",
            event.start,
            event.end,
            event.category(),
            texts.first().map(String::as_str).unwrap_or("")
        )?;
        self.count += 1;
        Ok(())
    }
}

/// Adapter for a logic analyzer host's annotation primitive.
///
/// The callback receives `(start, end, category_index, label_variants)`,
/// labels ordered from longest to shortest.
pub struct HostAnnotations<F> {
    put: F,
}

impl<F> HostAnnotations<F>
where
    F: FnMut(u64, u64, usize, Vec<String>),
{
    pub fn new(put: F) -> Self {
        Self { put }
    }
}

impl<F> AnnotationSink for HostAnnotations<F>
where
    F: FnMut(u64, u64, usize, Vec<String>),
{
    fn annotate(&mut self, event: ProtocolEvent) -> Result<()> {
        let texts = labels(&event);
        (self.put)(event.start, event.end, event.category().index(), texts);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::{Category, EventKind};

    fn command(start: u64, end: u64) -> ProtocolEvent {
        ProtocolEvent::new(
            start,
            end,
            EventKind::Command {
                opcode: 0x20,
                mnemonic: Some("READ_SECTORS".to_string()),
            },
        )
    }

    #[test]
    fn test_event_log_lines() {
        let mut log = EventLog::new(Vec::new());
        log.annotate(command(10, 20)).unwrap();
        log.annotate(ProtocolEvent::new(25, 30, EventKind::CaptureOverflow))
            .unwrap();
        assert_eq!(log.count(), 2);

        let text = String::from_utf8(log.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "10..20 cmd Command 0x20: READ_SECTORS");
        assert_eq!(
            lines[1],
            "25..30 event Sniffer capture overflow, lost samples"
        );
    }

    #[test]
    fn test_host_annotations_forward_index_and_labels() {
        let mut calls = Vec::new();
        {
            let mut host = HostAnnotations::new(|s, e, idx, texts| calls.push((s, e, idx, texts)));
            host.annotate(command(1, 2)).unwrap();
        }
        assert_eq!(calls.len(), 1);
        let (s, e, idx, texts) = &calls[0];
        assert_eq!((*s, *e), (1, 2));
        assert_eq!(*idx, Category::Command.index());
        assert_eq!(texts[2], "C 20");
    }

    #[test]
    fn test_mut_ref_sink() {
        fn feed<S: AnnotationSink>(mut sink: S) {
            sink.annotate(command(0, 1)).unwrap();
        }

        let mut events: Vec<ProtocolEvent> = Vec::new();
        feed(&mut events);
        feed(&mut events);
        assert_eq!(events.len(), 2);
    }
}
