//! Sniffer capture file source
//!
//! Provides `SniffFileSource`, which reads a raw `sniff.dat` capture written
//! by the RP2350 sniffer and yields decoded [`Sample`]s lazily, one block at
//! a time. Captures of several gigabytes decode in constant memory.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::decoders::{TraceDecoder, TraceFormat};
use crate::Result;
use crate::runtime::Sample;

/// Bytes read from the capture per block
pub const DEFAULT_BLOCK_SIZE: usize = 65536;

/// Capture file on disk
#[derive(Debug, Clone)]
pub struct SniffFileSource {
    path: PathBuf,
    len_bytes: u64,
    block_size: usize,
    format: TraceFormat,
}

impl SniffFileSource {
    /// Open a capture file. The file is only stat'ed here; every call to
    /// [`samples`](Self::samples) reads it again from the start.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len_bytes = std::fs::metadata(&path)?.len();
        if len_bytes % 4 != 0 {
            debug!(
                "{}: {} trailing bytes will be ignored",
                path.display(),
                len_bytes % 4
            );
        }
        Ok(Self {
            path,
            len_bytes,
            block_size: DEFAULT_BLOCK_SIZE,
            format: TraceFormat::rp2350(),
        })
    }

    /// Set the read block size (builder pattern). Clamped to at least one byte.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Decode with a custom word format
    pub fn with_format(mut self, format: TraceFormat) -> Result<Self> {
        format.validate()?;
        self.format = format;
        Ok(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the capture in bytes
    pub fn len_bytes(&self) -> u64 {
        self.len_bytes
    }

    /// Number of complete capture words, an upper bound on the sample count
    pub fn word_count(&self) -> u64 {
        self.len_bytes / 4
    }

    /// Open the file and start decoding from the beginning
    pub fn samples(&self) -> Result<CaptureSamples<BufReader<File>>> {
        let file = File::open(&self.path)?;
        info!(
            "Reading {} ({} bytes, {} words)",
            self.path.display(),
            self.len_bytes,
            self.word_count()
        );
        let decoder = TraceDecoder::with_format(self.format)?;
        Ok(CaptureSamples::with_decoder(
            BufReader::new(file),
            decoder,
            self.block_size,
        ))
    }
}

/// Lazy sample stream over any byte reader holding a capture
///
/// A read error ends the stream like end of file would. The error is kept
/// and can be collected with [`take_error`](Self::take_error) once the
/// consumer is done.
pub struct CaptureSamples<R> {
    reader: R,
    decoder: TraceDecoder,
    block: Vec<u8>,
    pending: Vec<Sample>,
    position: usize,
    bytes_read: u64,
    blocks_read: u64,
    samples_emitted: u64,
    done: bool,
    error: Option<std::io::Error>,
}

impl<R: Read> CaptureSamples<R> {
    /// Decode an RP2350 capture from `reader`
    pub fn new(reader: R) -> Self {
        Self::with_decoder(reader, TraceDecoder::new(), DEFAULT_BLOCK_SIZE)
    }

    pub fn with_decoder(reader: R, decoder: TraceDecoder, block_size: usize) -> Self {
        Self {
            reader,
            decoder,
            block: vec![0; block_size.max(1)],
            pending: Vec::new(),
            position: 0,
            bytes_read: 0,
            blocks_read: 0,
            samples_emitted: 0,
            done: false,
            error: None,
        }
    }

    /// Bytes consumed from the reader so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Samples handed out so far
    pub fn samples_emitted(&self) -> u64 {
        self.samples_emitted
    }

    /// The read error that ended the stream, if any
    pub fn take_error(&mut self) -> Option<std::io::Error> {
        self.error.take()
    }

    /// Read the next block into `pending`. Returns false once the reader is
    /// exhausted and the trailing sample has been queued.
    fn refill(&mut self) -> bool {
        self.pending.clear();
        self.position = 0;

        while self.pending.is_empty() {
            if self.done {
                return false;
            }

            let n = match self.reader.read(&mut self.block) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Capture read failed after {} bytes: {}", self.bytes_read, e);
                    self.error = Some(e);
                    0
                }
            };

            if n == 0 {
                self.done = true;
                self.pending.extend(self.decoder.finish());
                info!(
                    "Capture complete: {} bytes, {} words, {} samples",
                    self.bytes_read,
                    self.decoder.words_decoded(),
                    self.samples_emitted + self.pending.len() as u64
                );
                continue;
            }

            self.decoder.decode_chunk(&self.block[..n], &mut self.pending);
            self.bytes_read += n as u64;
            self.blocks_read += 1;
            if self.blocks_read % 256 == 0 {
                debug!(
                    "Progress: {} bytes, {} samples",
                    self.bytes_read, self.samples_emitted
                );
            }
        }
        true
    }
}

impl<R: Read> Iterator for CaptureSamples<R> {
    type Item = Sample;

    fn next(&mut self) -> Option<Sample> {
        if self.position == self.pending.len() && !self.refill() {
            return None;
        }
        let sample = self.pending[self.position];
        self.position += 1;
        self.samples_emitted += 1;
        Some(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::decoders::TraceEncoder;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    fn capture() -> Vec<u8> {
        let mut encoder = TraceEncoder::new();
        for i in 1..=200u64 {
            encoder.push(i * 50, i & 0x3).unwrap();
        }
        encoder.finish_bytes(20_000).unwrap()
    }

    fn write_capture(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_open_missing_file() {
        assert!(SniffFileSource::open("does/not/exist/sniff.dat").is_err());
    }

    #[test]
    fn test_file_matches_in_memory_decode() {
        let bytes = capture();
        let file = write_capture(&bytes);

        let source = SniffFileSource::open(file.path()).unwrap();
        assert_eq!(source.len_bytes(), bytes.len() as u64);

        let from_file: Vec<Sample> = source.samples().unwrap().collect();
        assert_eq!(from_file, TraceDecoder::decode(&bytes));
        assert_eq!(from_file.last().unwrap().timestamp, 20_000);
    }

    #[test]
    fn test_block_size_does_not_change_result() {
        let bytes = capture();
        let file = write_capture(&bytes);
        let expected = TraceDecoder::decode(&bytes);

        for block_size in [1, 3, 4, 7, 64, 1 << 20] {
            let source = SniffFileSource::open(file.path())
                .unwrap()
                .with_block_size(block_size);
            let samples: Vec<Sample> = source.samples().unwrap().collect();
            assert_eq!(samples, expected, "block size {}", block_size);
        }
    }

    #[test]
    fn test_samples_restart_from_beginning() {
        let file = write_capture(&capture());
        let source = SniffFileSource::open(file.path()).unwrap();
        let first: Vec<Sample> = source.samples().unwrap().take(5).collect();
        let again: Vec<Sample> = source.samples().unwrap().take(5).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn test_truncated_file_tail_is_ignored() {
        let mut bytes = capture();
        let expected = TraceDecoder::decode(&bytes);
        bytes.extend_from_slice(&[0xAB, 0xCD]);
        let file = write_capture(&bytes);

        let samples: Vec<Sample> = SniffFileSource::open(file.path())
            .unwrap()
            .samples()
            .unwrap()
            .collect();
        assert_eq!(samples, expected);
    }

    #[test]
    fn test_counters() {
        let bytes = capture();
        let mut samples = CaptureSamples::new(Cursor::new(bytes.clone()));
        let count = samples.by_ref().count() as u64;
        assert_eq!(samples.bytes_read(), bytes.len() as u64);
        assert_eq!(samples.samples_emitted(), count);
        assert!(samples.take_error().is_none());
        assert_eq!(samples.next(), None);
    }

    #[test]
    fn test_empty_capture() {
        let mut samples = CaptureSamples::new(Cursor::new(Vec::new()));
        assert_eq!(samples.next(), None);
        assert_eq!(samples.bytes_read(), 0);
    }

    struct FailingReader {
        data: Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(std::io::Error::other("device gone")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_read_error_ends_stream_and_is_kept() {
        let bytes = capture();
        let expected = TraceDecoder::decode(&bytes);
        let mut samples = CaptureSamples::new(FailingReader {
            data: Cursor::new(bytes),
        });
        let decoded: Vec<Sample> = samples.by_ref().collect();
        assert_eq!(decoded, expected);
        let err = samples.take_error().unwrap();
        assert_eq!(err.to_string(), "device gone");
    }
}
