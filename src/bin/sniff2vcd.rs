//! Convert a ZuluIDE RP2350 sniffer capture to a VCD file
//!
//! Usage:
//!   sniff2vcd sniff.dat
//!
//! Writes `sniff.vcd` next to the capture. With `--annotate` the capture is
//! also run through the ATA protocol decoder and the events are written to
//! `sniff.ata.txt`.

use std::error::Error;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use sniff::{
    AtaDecoder, CaptureSamples, DecoderConfig, EventLog, SignalMap, SniffFileSource, VcdConfig,
    VcdWriter,
};
use tracing::info;

/// Print a progress line every this many transitions
const PROGRESS_INTERVAL: u64 = 1 << 20;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Capture file written by the sniffer
    capture: PathBuf,

    /// Group address and data lines into buses instead of one wire per line
    #[arg(long)]
    grouped: bool,

    /// Capture ticks per VCD time unit
    #[arg(long, default_value = "5")]
    divider: u64,

    /// Capture clock in Hz
    #[arg(long, default_value = "150000000")]
    cpu_freq: f64,

    /// Also decode the ATA protocol and write an event log
    #[arg(long)]
    annotate: bool,

    /// Longest DATA_SEL pulse, in ticks, read as a control mux write
    #[arg(long, default_value = "25")]
    ctrl_mux_threshold: u64,
}

/// Result of one conversion
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    transitions: u64,
    /// Event count, when annotating
    events: Option<u64>,
}

/// Waveform and event log written next to `capture`
fn output_paths(capture: &Path) -> (PathBuf, PathBuf) {
    (
        capture.with_extension("vcd"),
        capture.with_extension("ata.txt"),
    )
}

/// Copy every sample to `writer`, failing if the capture could not be read
/// to the end
fn write_vcd<R, W>(
    samples: &mut CaptureSamples<R>,
    writer: &mut VcdWriter<W>,
    approx_total: u64,
) -> Result<u64, Box<dyn Error>>
where
    R: Read,
    W: Write,
{
    while let Some(sample) = samples.next() {
        writer.write_sample(&sample)?;
        if writer.samples_written() % PROGRESS_INTERVAL == 0 {
            println!(
                "{} transitions of about {} ({} MB read)",
                writer.samples_written(),
                approx_total,
                samples.bytes_read() >> 20
            );
        }
    }
    if let Some(e) = samples.take_error() {
        return Err(e.into());
    }
    Ok(writer.samples_written())
}

fn convert(args: &Args) -> Result<Summary, Box<dyn Error>> {
    let config = VcdConfig::default()
        .with_divider(args.divider)
        .with_cpu_frequency(args.cpu_freq);
    config.validate()?;

    let source = SniffFileSource::open(&args.capture)?;
    let map = if args.grouped {
        SignalMap::rp2350_grouped()
    } else {
        SignalMap::rp2350()
    };
    let (vcd_path, log_path) = output_paths(&args.capture);

    println!("Writing to {}", vcd_path.display());
    let mut writer = VcdWriter::new(
        BufWriter::new(File::create(&vcd_path)?),
        map.clone(),
        config,
    )?;
    let transitions = write_vcd(&mut source.samples()?, &mut writer, source.word_count())?;
    writer.finish()?;
    println!("Done, total {} transitions", transitions);

    let mut summary = Summary {
        transitions,
        events: None,
    };
    if !args.annotate {
        return Ok(summary);
    }

    println!("Writing events to {}", log_path.display());
    let decoder = AtaDecoder::new(
        &map,
        DecoderConfig::default().with_ctrl_mux_threshold(args.ctrl_mux_threshold),
    )?
    .with_name("sniff2vcd");
    let mut log = EventLog::new(BufWriter::new(File::create(&log_path)?));
    let mut samples = source.samples()?;
    let stats = decoder.run(&mut samples, &mut log)?;
    if let Some(e) = samples.take_error() {
        return Err(e.into());
    }
    log.into_inner()?;

    info!(
        "Decoded {} accesses into {} events ({} overflows, {} truncated)",
        stats.accesses, stats.events, stats.overflows, stats.truncated_accesses
    );
    println!("Done, total {} events", stats.events);
    summary.events = Some(stats.events);
    Ok(summary)
}

fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    convert(&args)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sniff::{TraceDecoder, TraceEncoder};
    use std::ffi::OsString;
    use std::io::Cursor;
    use tempfile::TempDir;

    const IDLE: u64 = 0b11;

    fn bus(address: u8, data: u16) -> u64 {
        IDLE | (u64::from(address) << 2) | (u64::from(data) << 8)
    }

    /// DEVICE select, IDENTIFY DEVICE and a status read
    fn capture_bytes() -> Vec<u8> {
        let mut encoder = TraceEncoder::new();
        encoder.push(5, bus(0, 0)).unwrap();
        let accesses: [(u64, u8, u16); 3] =
            [(0b01, 0x16, 0x00), (0b01, 0x17, 0xEC), (0b10, 0x17, 0x50)];
        let mut t = 100;
        for (strobe, address, data) in accesses {
            encoder.push(t, bus(address, data) & !strobe).unwrap();
            encoder.push(t + 40, bus(address, data)).unwrap();
            t += 200;
        }
        encoder.finish_bytes(t).unwrap()
    }

    fn write_capture(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("sniff.dat");
        std::fs::write(&path, capture_bytes()).unwrap();
        path
    }

    fn args(capture: &Path, extra: &[&str]) -> Args {
        let mut argv = vec![OsString::from("sniff2vcd"), capture.as_os_str().to_owned()];
        argv.extend(extra.iter().map(OsString::from));
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_output_paths() {
        let (vcd, log) = output_paths(Path::new("/captures/sniff.dat"));
        assert_eq!(vcd, PathBuf::from("/captures/sniff.vcd"));
        assert_eq!(log, PathBuf::from("/captures/sniff.ata.txt"));

        let (vcd, log) = output_paths(Path::new("trace"));
        assert_eq!(vcd, PathBuf::from("trace.vcd"));
        assert_eq!(log, PathBuf::from("trace.ata.txt"));
    }

    #[test]
    fn test_usage_errors() {
        let err = Args::try_parse_from(["sniff2vcd"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert!(Args::try_parse_from(["sniff2vcd", "a.dat", "b.dat"]).is_err());
        assert!(Args::try_parse_from(["sniff2vcd", "a.dat", "--divider", "five"]).is_err());
    }

    #[test]
    fn test_convert_writes_vcd_next_to_capture() {
        let dir = TempDir::new().unwrap();
        let capture = write_capture(&dir);

        let summary = convert(&args(&capture, &[])).unwrap();
        assert_eq!(
            summary.transitions as usize,
            TraceDecoder::decode(&capture_bytes()).len()
        );
        assert_eq!(summary.events, None);

        let vcd = std::fs::read_to_string(dir.path().join("sniff.vcd")).unwrap();
        assert!(vcd.starts_with("$version ZuluIDE RP2350 Sniffer $end\n"));
        assert!(vcd.contains("$timescale 33333ps $end"));
        assert!(!dir.path().join("sniff.ata.txt").exists());
    }

    #[test]
    fn test_convert_with_annotations() {
        let dir = TempDir::new().unwrap();
        let capture = write_capture(&dir);

        let summary = convert(&args(&capture, &["--annotate", "--grouped"])).unwrap();
        let events = summary.events.unwrap();
        assert!(events > 0);

        let vcd = std::fs::read_to_string(dir.path().join("sniff.vcd")).unwrap();
        assert!(vcd.contains("$var wire 16 d DATA $end"));

        let log = std::fs::read_to_string(dir.path().join("sniff.ata.txt")).unwrap();
        assert_eq!(log.lines().count() as u64, events);
        assert!(log.contains(" cmd Command 0xEC: IDENTIFY_DEVICE"));
    }

    #[test]
    fn test_convert_missing_capture_fails() {
        let dir = TempDir::new().unwrap();
        let result = convert(&args(&dir.path().join("missing.dat"), &[]));
        assert!(result.is_err());
        assert!(!dir.path().join("missing.vcd").exists());
    }

    #[test]
    fn test_convert_rejects_bad_timescale() {
        let dir = TempDir::new().unwrap();
        let capture = write_capture(&dir);
        assert!(convert(&args(&capture, &["--divider", "0"])).is_err());
        assert!(convert(&args(&capture, &["--cpu-freq", "0"])).is_err());
        assert!(!dir.path().join("sniff.vcd").exists());
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
    fn test_read_error_fails_conversion() {
        let mut samples = CaptureSamples::new(FailingReader {
            data: Cursor::new(capture_bytes()),
        });
        let mut writer =
            VcdWriter::new(Vec::new(), SignalMap::rp2350(), VcdConfig::default()).unwrap();
        let err = write_vcd(&mut samples, &mut writer, 0).unwrap_err();
        assert_eq!(err.to_string(), "device gone");
        assert!(writer.samples_written() > 0);
    }
}
