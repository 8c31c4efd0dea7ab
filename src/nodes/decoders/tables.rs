//! Register, command and flag tables for the parallel ATA decoder
//!
//! The tables are plain data injected into the decoder through [`AtaTables`],
//! so alternate command sets can be substituted without touching the state
//! machine.

use std::collections::HashMap;

/// DEVICE CONTROL on write, ALTERNATE STATUS on read
pub const REG_CONTROL: u8 = 0x0E;
pub const REG_DATA: u8 = 0x10;
pub const REG_DEVICE: u8 = 0x16;
/// COMMAND on write, STATUS on read
pub const REG_COMMAND: u8 = 0x17;

/// ATA PACKET command; the next DATA write carries the ATAPI opcode
pub const CMD_PACKET: u8 = 0xA0;

/// Register names by address for host writes
pub const WRITE_REGISTERS: &[(u8, &str)] = &[
    (0x0E, "DEVICE_CONTROL"),
    (0x10, "DATA"),
    (0x11, "FEATURE"),
    (0x12, "SECTOR_COUNT"),
    (0x13, "LBA_LOW"),
    (0x14, "LBA_MID"),
    (0x15, "LBA_HIGH"),
    (0x16, "DEVICE"),
    (0x17, "COMMAND"),
];

/// Register names by address for host reads
pub const READ_REGISTERS: &[(u8, &str)] = &[
    (0x0E, "ALT_STATUS"),
    (0x10, "DATA"),
    (0x11, "ERROR"),
    (0x12, "SECTOR_COUNT"),
    (0x13, "LBA_LOW"),
    (0x14, "LBA_MID"),
    (0x15, "LBA_HIGH"),
    (0x16, "DEVICE"),
    (0x17, "STATUS"),
];

pub const ATA_COMMANDS: &[(u8, &str)] = &[
    (0x00, "NOP"),
    (0x03, "CFA_REQUEST_EXTENDED_ERROR"),
    (0x08, "DEVICE_RESET"),
    (0x20, "READ_SECTORS"),
    (0x24, "READ_SECTORS_EXT"),
    (0x25, "READ_DMA_EXT"),
    (0x26, "READ_DMA_QUEUED_EXT"),
    (0x27, "READ_NATIVE_MAX_ADDRESS_EXT"),
    (0x29, "READ_MULTIPLE_EXT"),
    (0x2F, "READ_LOG_EXT"),
    (0x30, "WRITE_SECTORS"),
    (0x34, "WRITE_SECTORS_EXT"),
    (0x35, "WRITE_DMA_EXT"),
    (0x36, "WRITE_DMA_QUEUED_EXT"),
    (0x37, "SET_MAX_ADDRESS_EXT"),
    (0x38, "CFA_WRITE_SECTORS_WOUT_ERASE"),
    (0x39, "WRITE_MULTIPLE_EXT"),
    (0x3F, "WRITE_LOG_EXT"),
    (0x40, "READ_VERIFY_SECTORS"),
    (0x42, "READ_VERIFY_SECTORS_EXT"),
    (0x70, "SEEK"),
    (0x87, "CFA_TRANSLATE_SECTOR"),
    (0x90, "EXECUTE_DEVICE_DIAGNOSTIC"),
    (0x91, "INIT_DEV_PARAMS"),
    (0x92, "DOWNLOAD_MICROCODE"),
    (0xA0, "PACKET"),
    (0xA1, "IDENTIFY_PACKET_DEVICE"),
    (0xA2, "SERVICE"),
    (0xB0, "SMART"),
    (0xB1, "DEVICE_CONFIGURATION"),
    (0xC0, "CFA_ERASE_SECTORS"),
    (0xC4, "READ_MULTIPLE"),
    (0xC5, "WRITE_MULTIPLE"),
    (0xC6, "SET_MULTIPLE_MODE"),
    (0xC7, "READ_DMA_QUEUED"),
    (0xC8, "READ_DMA"),
    (0xCA, "WRITE_DMA"),
    (0xCC, "WRITE_DMA_QUEUED"),
    (0xCD, "CFA_WRITE_MULTIPLE_WOUT_ERASE"),
    (0xD1, "CHECK_MEDIA_CARD_TYPE"),
    (0xDA, "GET_MEDIA_STATUS"),
    (0xDE, "MEDIA_LOCK"),
    (0xDF, "MEDIA_UNLOCK"),
    (0xE0, "STANDBY_IMMEDIATE"),
    (0xE1, "IDLE_IMMEDIATE"),
    (0xE2, "STANDBY"),
    (0xE3, "IDLE"),
    (0xE4, "READ_BUFFER"),
    (0xE5, "CHECK_POWER_MODE"),
    (0xE6, "SLEEP"),
    (0xE7, "FLUSH_CACHE"),
    (0xE8, "WRITE_BUFFER"),
    (0xEA, "FLUSH_CACHE_EXT"),
    (0xEC, "IDENTIFY_DEVICE"),
    (0xED, "MEDIA_EJECT"),
    (0xEF, "SET_FEATURES"),
    (0xF1, "SECURITY_SET_PASSWORD"),
    (0xF2, "SECURITY_UNLOCK"),
    (0xF3, "SECURITY_ERASE_PREPARE"),
    (0xF4, "SECURITY_ERASE_UNIT"),
    (0xF5, "SECURITY_FREEZE_LOCK"),
    (0xF6, "SECURITY_DISABLE_PASSWORD"),
    (0xF8, "READ_NATIVE_MAX_ADDRESS"),
    (0xF9, "SET_MAX_ADDRESS"),
];

pub const ATAPI_COMMANDS: &[(u8, &str)] = &[
    (0x00, "TEST UNIT READY"),
    (0x03, "REQUEST SENSE"),
    (0x04, "FORMAT UNIT"),
    (0x12, "INQUIRY"),
    (0x1B, "START STOP UNIT"),
    (0x1E, "PREVENT ALLOW MEDIUM REMOVAL"),
    (0x23, "READ FORMAT CAPACITIES"),
    (0x25, "READ CAPACITY"),
    (0x28, "READ (10)"),
    (0x2A, "WRITE (10)"),
    (0x2B, "SEEK (10)"),
    (0x2E, "WRITE AND VERIFY (10)"),
    (0x2F, "VERIFY (10)"),
    (0x35, "SYNCHRONIZE CACHE"),
    (0x3B, "WRITE BUFFER"),
    (0x3C, "READ BUFFER"),
    (0x43, "READ TOC/PMA/ATIP"),
    (0x46, "GET CONFIGURATION"),
    (0x4A, "GET EVENT STATUS NOTIFICATION"),
    (0x51, "READ DISC INFORMATION"),
    (0x52, "READ TRACK INFORMATION"),
    (0x53, "RESERVE TRACK"),
    (0x54, "SEND OPC INFORMATION"),
    (0x55, "MODE SELECT (10)"),
    (0x58, "REPAIR TRACK"),
    (0x5A, "MODE SENSE (10)"),
    (0x5B, "CLOSE TRACK SESSION"),
    (0x5C, "READ BUFFER CAPACITY"),
    (0x5D, "SEND CUE SHEET"),
    (0xA0, "REPORT LUNS"),
    (0xA1, "BLANK"),
    (0xA2, "SECURITY PROTOCOL IN"),
    (0xA3, "SEND KEY"),
    (0xA4, "REPORT KEY"),
    (0xA6, "LOAD/UNLOAD MEDIUM"),
    (0xA7, "SET READ AHEAD"),
    (0xA8, "READ (12)"),
    (0xAA, "WRITE (12)"),
    (0xAB, "READ MEDIA SERIAL NUMBER"),
    (0xAC, "GET PERFORMANCE"),
    (0xAD, "READ DISC STRUCTURE"),
    (0xB5, "SECURITY PROTOCOL OUT"),
    (0xB6, "SET STREAMING"),
    (0xB9, "READ CD MSF"),
    (0xBB, "SET CD SPEED"),
    (0xBD, "MECHANISM STATUS"),
    (0xBE, "READ CD"),
    (0xBF, "SEND DISC STRUCTURE"),
];

/// Status register flags from bit 7 down to bit 0
pub const STATUS_FLAGS: [(u8, &str); 8] = [
    (0x80, "BSY(7)"),
    (0x40, "DRDY(6)"),
    (0x20, "DEVFAULT(5)"),
    (0x10, "SEEKDONE(4)"),
    (0x08, "DATAREQ(3)"),
    (0x04, "ERRCORR(2)"),
    (0x02, "IDX(1)"),
    (0x01, "ERR(0)"),
];

/// Control mux bits: (inverted, mask, name)
pub const CTRL_MUX_BITS: [(bool, u16, &str); 6] = [
    (true, 1 << 9, "EN_DMARQ"),
    (false, 1 << 10, "OUT_DMARQ"),
    (true, 1 << 11, "EN_INTRQ"),
    (false, 1 << 12, "OUT_INTRQ"),
    (true, 1 << 13, "OUT_DASP"),
    (true, 1 << 14, "OUT_PDIAG"),
];

/// Names of the status flags set in `value`, bit 7 first
pub fn status_flags(value: u8) -> Vec<&'static str> {
    STATUS_FLAGS
        .iter()
        .filter(|(mask, _)| value & mask != 0)
        .map(|&(_, name)| name)
        .collect()
}

/// Names of the control mux outputs asserted by a mux write
pub fn ctrl_mux_active(value: u16) -> Vec<&'static str> {
    CTRL_MUX_BITS
        .iter()
        .filter(|&&(inverted, mask, _)| (value & mask != 0) != inverted)
        .map(|&(_, _, name)| name)
        .collect()
}

/// Code to name lookup
pub type NameTable = HashMap<u8, String>;

fn build(entries: &[(u8, &str)]) -> NameTable {
    entries
        .iter()
        .map(|&(code, name)| (code, name.to_string()))
        .collect()
}

/// Lookup tables used by the state machine to name registers and commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtaTables {
    pub write_registers: NameTable,
    pub read_registers: NameTable,
    pub commands: NameTable,
    pub atapi_commands: NameTable,
}

impl AtaTables {
    /// Tables with no entries; every lookup renders as unknown
    pub fn empty() -> Self {
        Self {
            write_registers: NameTable::new(),
            read_registers: NameTable::new(),
            commands: NameTable::new(),
            atapi_commands: NameTable::new(),
        }
    }

    /// Replace the ATA command table
    pub fn with_commands(mut self, commands: NameTable) -> Self {
        self.commands = commands;
        self
    }

    /// Replace the ATAPI command table
    pub fn with_atapi_commands(mut self, atapi_commands: NameTable) -> Self {
        self.atapi_commands = atapi_commands;
        self
    }

    pub fn register_name(&self, address: u8, is_write: bool) -> Option<&str> {
        let table = if is_write {
            &self.write_registers
        } else {
            &self.read_registers
        };
        table.get(&address).map(String::as_str)
    }

    pub fn command_name(&self, opcode: u8) -> Option<&str> {
        self.commands.get(&opcode).map(String::as_str)
    }

    pub fn atapi_name(&self, opcode: u8) -> Option<&str> {
        self.atapi_commands.get(&opcode).map(String::as_str)
    }
}

impl Default for AtaTables {
    fn default() -> Self {
        Self {
            write_registers: build(WRITE_REGISTERS),
            read_registers: build(READ_REGISTERS),
            commands: build(ATA_COMMANDS),
            atapi_commands: build(ATAPI_COMMANDS),
        }
    }
}
