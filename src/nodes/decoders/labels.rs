//! Text rendering of protocol events
//!
//! Every event renders as a list of label variants, longest first, so a
//! viewer can pick the one that fits the space it has.

use super::tables::{ctrl_mux_active, status_flags};
use super::types::{EventKind, ProtocolEvent};

const UNKNOWN_REGISTER: &str = "UNKNOWN";
const UNKNOWN_COMMAND: &str = "(unknown cmd)";
const UNKNOWN_ATAPI: &str = "(unknown ATAPI cmd)";

/// Label variants for `event`, longest first
pub fn labels(event: &ProtocolEvent) -> Vec<String> {
    match &event.kind {
        EventKind::DeviceSelected { device } => {
            vec![format!("Device {}", device), format!("D{}", device)]
        }
        EventKind::RegisterWrite {
            address,
            register,
            value,
        } => {
            let name = register.as_deref().unwrap_or(UNKNOWN_REGISTER);
            vec![
                format!("Write {} (0x{:02X}): value 0x{:02X}", name, address, value),
                format!("WR {} {:02X}", name, value),
                format!("W {:02X}", value),
            ]
        }
        EventKind::RegisterRead {
            address,
            register,
            value,
        } => {
            let name = register.as_deref().unwrap_or(UNKNOWN_REGISTER);
            vec![
                format!("Read {} (0x{:02X}): value 0x{:02X}", name, address, value),
                format!("RD {} {:02X}", name, value),
                format!("R {:02X}", value),
            ]
        }
        EventKind::DataWrite { value } => {
            vec![format!("Write data 0x{:04X}", value), format!("W {:04X}", value)]
        }
        EventKind::DataRead { value } => {
            vec![format!("Read data 0x{:04X}", value), format!("R {:04x}", value)]
        }
        EventKind::Command { opcode, mnemonic } => {
            let name = mnemonic.as_deref().unwrap_or(UNKNOWN_COMMAND);
            vec![
                format!("Command 0x{:02X}: {}", opcode, name),
                format!("CMD {}", name),
                format!("C {:02X}", opcode),
            ]
        }
        EventKind::AtapiCommand { opcode, mnemonic } => {
            let name = mnemonic.as_deref().unwrap_or(UNKNOWN_ATAPI);
            vec![
                format!("ATAPI command 0x{:02X}: {}", opcode, name),
                format!("ATAPI {}", name),
                format!("A {:02X}", opcode),
            ]
        }
        EventKind::DataTransfer { direction, words } => {
            vec![
                format!("Data {} {} words", direction, words),
                format!("D {}", words),
            ]
        }
        EventKind::Status { value } => {
            let flags = status_flags(*value).join(" ");
            vec![
                format!("Status 0x{:02X} {}", value, flags),
                format!("S {:02X}", value),
            ]
        }
        EventKind::CaptureOverflow => vec![
            "Sniffer capture overflow, lost samples".to_string(),
            "Capture overflow".to_string(),
            "Overflow".to_string(),
        ],
        EventKind::ControlMuxWrite { value } => {
            let mux = value >> 8;
            let active = ctrl_mux_active(*value).join(", ");
            vec![
                format!("Control mux write 0x{:02x} {}", mux, active),
                format!("Ctrl Mux 0x{:02x}", mux),
                format!("{:02x}", mux),
            ]
        }
    }
}
