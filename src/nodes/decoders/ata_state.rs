//! Pending protocol state for the parallel ATA decoder
//!
//! Several logical activities are open at the same time on an ATA bus: a
//! command waiting for completion, a run of DATA register words, a status
//! poll loop, the currently selected device. Each family gets one slot
//! (`Option<Pending..>`) that is opened, updated in place and finally closed
//! into a [`ProtocolEvent`] when a later access ends it.
//!
//! Every incoming access is checked against the open slots in a fixed order
//! (ATAPI command, command, data transfer, status, device) before it opens
//! anything itself. One access may close several families at once.

use tracing::{debug, trace};

use super::tables::{AtaTables, CMD_PACKET, REG_COMMAND, REG_CONTROL, REG_DATA, REG_DEVICE};
use super::types::{BusAccess, Direction, EventKind, ProtocolEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingCommand {
    start: u64,
    opcode: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTransfer {
    start: u64,
    direction: Direction,
    words: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingStatus {
    start: u64,
    value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingDevice {
    start: u64,
    device: u8,
}

/// Register-level protocol state machine.
///
/// Consumes [`BusAccess`]es in time order and produces closed events. One
/// tracker belongs to one capture; call [`reset`](Self::reset) before reusing
/// it.
#[derive(Debug, Clone)]
pub struct AtaStateTracker {
    tables: AtaTables,
    command: Option<PendingCommand>,
    atapi: Option<PendingCommand>,
    transfer: Option<PendingTransfer>,
    status: Option<PendingStatus>,
    device: Option<PendingDevice>,
}

impl AtaStateTracker {
    pub fn new(tables: AtaTables) -> Self {
        Self {
            tables,
            command: None,
            atapi: None,
            transfer: None,
            status: None,
            device: None,
        }
    }

    pub fn tables(&self) -> &AtaTables {
        &self.tables
    }

    /// Forget every open event
    pub fn reset(&mut self) {
        self.command = None;
        self.atapi = None;
        self.transfer = None;
        self.status = None;
        self.device = None;
    }

    /// True while any family still has an open event
    pub fn has_open(&self) -> bool {
        self.command.is_some()
            || self.atapi.is_some()
            || self.transfer.is_some()
            || self.status.is_some()
            || self.device.is_some()
    }

    /// The register access itself as an event
    pub fn describe(&self, access: &BusAccess) -> ProtocolEvent {
        let kind = match (access.direction, access.address) {
            (Direction::Write, REG_DATA) => EventKind::DataWrite {
                value: access.value,
            },
            (Direction::Read, REG_DATA) => EventKind::DataRead {
                value: access.value,
            },
            (Direction::Write, address) => EventKind::RegisterWrite {
                address,
                register: self.tables.register_name(address, true).map(str::to_string),
                value: access.value as u8,
            },
            (Direction::Read, address) => EventKind::RegisterRead {
                address,
                register: self.tables.register_name(address, false).map(str::to_string),
                value: access.value as u8,
            },
        };
        ProtocolEvent::new(access.start, access.end, kind)
    }

    /// Feed one access; closed events are appended to `emitted`.
    pub fn process(&mut self, access: &BusAccess, emitted: &mut Vec<ProtocolEvent>) {
        let start = access.start;
        let is_write = access.is_write();
        let address = access.address;

        let is_command_write = is_write && address == REG_COMMAND;
        let is_device_write = is_write && address == REG_DEVICE;
        let is_status_read = !is_write && (address == REG_CONTROL || address == REG_COMMAND);

        if is_command_write || is_device_write {
            emitted.extend(self.close_atapi(start));
        }

        if let Some(command) = self.command {
            let sends_packet = is_write && address == REG_DATA && command.opcode == CMD_PACKET;
            if is_command_write || is_device_write || sends_packet {
                emitted.extend(self.close_command(start));
            }
            if sends_packet {
                let opcode = (access.value & 0xFF) as u8;
                debug!("ATAPI command 0x{:02X} opened at {}", opcode, start);
                self.atapi = Some(PendingCommand { start, opcode });
            }
        }

        let ends_transfer = self
            .transfer
            .is_some_and(|t| address != REG_DATA || t.direction != access.direction);
        if ends_transfer {
            emitted.extend(self.close_transfer(start));
        }

        let ends_status = (is_status_read || is_device_write || is_command_write)
            && self
                .status
                .is_some_and(|s| !is_status_read || access.value as u8 != s.value);
        if ends_status {
            emitted.extend(self.close_status(start));
        }

        if address == REG_DATA {
            match &mut self.transfer {
                Some(transfer) => transfer.words += 1,
                None => {
                    self.transfer = Some(PendingTransfer {
                        start,
                        direction: access.direction,
                        words: 1,
                    })
                }
            }
        } else if is_status_read {
            if self.status.is_none() {
                self.status = Some(PendingStatus {
                    start,
                    value: access.value as u8,
                });
            }
        } else if is_device_write {
            let device = ((access.value >> 4) & 1) as u8;
            if self.device.is_some_and(|d| d.device != device) {
                emitted.extend(self.close_device(start));
            }
            if self.device.is_none() {
                trace!("Device {} selected at {}", device, start);
                self.device = Some(PendingDevice { start, device });
            }
        } else if is_command_write {
            let opcode = access.value as u8;
            debug!("Command 0x{:02X} opened at {}", opcode, start);
            self.command = Some(PendingCommand { start, opcode });
        }
    }

    /// End of input: close every open family at `timestamp`.
    ///
    /// A device selection write to the other device is injected so the last
    /// device span (and everything a device change ends) closes through the
    /// normal path. The slot it opens is then discarded.
    pub fn finish(&mut self, timestamp: u64, emitted: &mut Vec<ProtocolEvent>) {
        let value = if self.device.is_some_and(|d| d.device == 1) {
            0x00
        } else {
            0x10
        };
        let eof = BusAccess::new(timestamp, timestamp, Direction::Write, REG_DEVICE, value);
        self.process(&eof, emitted);
        self.device = None;
        debug_assert!(!self.has_open(), "pending events left after flush");
    }

    fn close_atapi(&mut self, end: u64) -> Option<ProtocolEvent> {
        let PendingCommand { start, opcode } = self.atapi.take()?;
        let mnemonic = self.tables.atapi_name(opcode).map(str::to_string);
        Some(ProtocolEvent::new(
            start,
            end,
            EventKind::AtapiCommand { opcode, mnemonic },
        ))
    }

    fn close_command(&mut self, end: u64) -> Option<ProtocolEvent> {
        let PendingCommand { start, opcode } = self.command.take()?;
        let mnemonic = self.tables.command_name(opcode).map(str::to_string);
        Some(ProtocolEvent::new(
            start,
            end,
            EventKind::Command { opcode, mnemonic },
        ))
    }

    fn close_transfer(&mut self, end: u64) -> Option<ProtocolEvent> {
        let PendingTransfer {
            start,
            direction,
            words,
        } = self.transfer.take()?;
        Some(ProtocolEvent::new(
            start,
            end,
            EventKind::DataTransfer { direction, words },
        ))
    }

    fn close_status(&mut self, end: u64) -> Option<ProtocolEvent> {
        let PendingStatus { start, value } = self.status.take()?;
        Some(ProtocolEvent::new(start, end, EventKind::Status { value }))
    }

    fn close_device(&mut self, end: u64) -> Option<ProtocolEvent> {
        let PendingDevice { start, device } = self.device.take()?;
        Some(ProtocolEvent::new(
            start,
            end,
            EventKind::DeviceSelected { device },
        ))
    }
}

impl Default for AtaStateTracker {
    fn default() -> Self {
        Self::new(AtaTables::default())
    }
}
