//! Pull-based sample receiver with lookahead and edge waiting
//!
//! [`SampleReceiver`] wraps any `Iterator<Item = Sample>` (a decoded capture
//! file, a replayed vector, a live host feed) and provides `recv`, `peek`
//! and `wait` operations. End of input is a plain `None`, and once seen it
//! is cached so every later call returns `None` immediately.

use std::collections::VecDeque;
use tracing::trace;

use super::sample::Sample;

/// A sample source with a lookahead buffer and a notion of "current" state.
///
/// `current` is the last sample handed out by [`recv`](Self::recv) or
/// [`wait`](Self::wait). Edge detection in `wait` compares against it.
pub struct SampleReceiver<I> {
    source: I,
    buffer: VecDeque<Sample>,
    current: Option<Sample>,
    eos: bool,
}

impl<I: Iterator<Item = Sample>> SampleReceiver<I> {
    pub fn new(source: I) -> Self {
        Self {
            source,
            buffer: VecDeque::new(),
            current: None,
            eos: false,
        }
    }

    fn pull(&mut self) -> Option<Sample> {
        if self.eos {
            return None;
        }
        if let Some(sample) = self.buffer.pop_front() {
            return Some(sample);
        }
        match self.source.next() {
            Some(sample) => Some(sample),
            None => {
                trace!("SampleReceiver - end of input");
                self.eos = true;
                None
            }
        }
    }

    /// Take the next sample, whatever changed
    pub fn recv(&mut self) -> Option<Sample> {
        let sample = self.pull()?;
        self.current = Some(sample);
        Some(sample)
    }

    /// Look at the next sample without consuming it
    pub fn peek(&mut self) -> Option<&Sample> {
        if self.buffer.is_empty() {
            if self.eos {
                return None;
            }
            match self.source.next() {
                Some(sample) => self.buffer.push_back(sample),
                None => {
                    self.eos = true;
                    return None;
                }
            }
        }
        self.buffer.front()
    }

    /// Block until a line selected by `watch` differs from the current state.
    ///
    /// The very first sample only establishes the baseline and is never
    /// returned. A `watch` of 0 waits for the next sample of any kind.
    pub fn wait(&mut self, watch: u64) -> Option<Sample> {
        if self.current.is_none() {
            self.recv()?;
        }

        loop {
            let previous = self.current.map(|s| s.signals).unwrap_or_default();
            let sample = self.recv()?;
            if watch == 0 || (sample.signals ^ previous) & watch != 0 {
                return Some(sample);
            }
        }
    }

    /// Last sample handed out
    pub fn current(&self) -> Option<&Sample> {
        self.current.as_ref()
    }

    /// Timestamp of the last sample handed out, 0 before the first
    pub fn last_timestamp(&self) -> u64 {
        self.current.map(|s| s.timestamp).unwrap_or(0)
    }

    /// True once the underlying source is exhausted and nothing is buffered
    pub fn is_finished(&self) -> bool {
        self.eos && self.buffer.is_empty()
    }
}
