//! Example: ATA protocol reconstruction
//!
//! Decodes a sniffer capture and prints the reconstructed protocol events.
//! Without `--file` a short synthetic session (device select, PACKET command
//! with an INQUIRY packet, status poll) is generated and decoded instead.
//!
//! Usage:
//!   cargo run --release --example ata_events -- --file sniff.dat -n 50
//!   cargo run --release --example ata_events -- --category cmd

use clap::Parser;
use sniff::{
    AtaDecoder, Category, DecoderConfig, HostAnnotations, Sample, SignalMap, SniffFileSource,
    TraceDecoder, TraceEncoder,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a capture file
    #[arg(short, long)]
    file: Option<String>,

    /// Number of events to print (0 = unlimited)
    #[arg(short, long, default_value = "0")]
    n: usize,

    /// Only print events of this annotation class (e.g. cmd, status, atapi)
    #[arg(long)]
    category: Option<String>,
}

const IDLE: u64 = 0b11;
const DIOW: u64 = 0b01;
const DIOR: u64 = 0b10;

fn bus(address: u8, data: u16) -> u64 {
    IDLE | (u64::from(address) << 2) | (u64::from(data) << 8)
}

/// Encode a host session as sniffer capture bytes
fn synthetic_capture() -> Result<Vec<u8>, sniff::SniffError> {
    let mut encoder = TraceEncoder::new();
    let mut t = 100;
    let mut access = |encoder: &mut TraceEncoder, strobe: u64, address: u8, data: u16| {
        let result = encoder
            .push(t, bus(address, data) & !strobe)
            .and_then(|_| encoder.push(t + 50, bus(address, data)));
        t += 500;
        result
    };

    encoder.push(5, bus(0, 0))?;
    access(&mut encoder, DIOW, 0x16, 0x00)?; // DEVICE
    access(&mut encoder, DIOW, 0x17, 0xA0)?; // PACKET
    for word in [0x0012u16, 0x0000, 0x0024, 0x0000, 0x0000, 0x0000] {
        access(&mut encoder, DIOW, 0x10, word)?;
    }
    for _ in 0..3 {
        access(&mut encoder, DIOR, 0x0E, 0x80)?; // busy
    }
    access(&mut encoder, DIOR, 0x0E, 0x58)?;
    for word in 0..18u16 {
        access(&mut encoder, DIOR, 0x10, 0x0500 + word)?;
    }
    access(&mut encoder, DIOR, 0x17, 0x50)?;
    encoder.push_overflow_marker(1234);
    let end = encoder.timestamp() + 1000;
    encoder.finish_bytes(end)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let samples: Box<dyn Iterator<Item = Sample>> = match &args.file {
        Some(path) => {
            info!("=== ATA events: {} ===", path);
            Box::new(SniffFileSource::open(path)?.samples()?)
        }
        None => {
            info!("=== ATA events: synthetic session ===");
            Box::new(TraceDecoder::decode(&synthetic_capture()?).into_iter())
        }
    };

    let filter = match &args.category {
        Some(id) => Some(
            Category::ALL
                .into_iter()
                .find(|c| c.id() == id.as_str())
                .ok_or_else(|| {
                    let known: Vec<String> = Category::ALL
                        .iter()
                        .map(|c| format!("{} ({})", c.id(), c.description()))
                        .collect();
                    format!("unknown category '{}', expected one of: {}", id, known.join(", "))
                })?,
        ),
        None => None,
    };

    let mut printed = 0;
    let sink = HostAnnotations::new(|start, end, index, texts: Vec<String>| {
        let category = Category::ALL[index];
        if filter.is_some_and(|f| f != category) || (args.n > 0 && printed >= args.n) {
            return;
        }
        printed += 1;
        println!(
            "{:>12} {:>12}  {:<12} {}",
            start,
            end,
            category.id(),
            texts.first().map(String::as_str).unwrap_or("")
        );
    });

    let decoder = AtaDecoder::new(&SignalMap::rp2350(), DecoderConfig::default())?;
    let stats = decoder.run(samples, sink)?;
    info!(
        "{} accesses, {} events, {} overflows",
        stats.accesses, stats.events, stats.overflows
    );

    Ok(())
}
