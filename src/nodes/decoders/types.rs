//! Common decoder types and enums

use std::fmt;

/// Transfer direction of a bus access, seen from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Host reads from the device (DIOR strobe)
    Read,
    /// Host writes to the device (DIOW strobe)
    Write,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Read => "read",
            Direction::Write => "write",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One register access, bounded by the falling and rising edge of a strobe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusAccess {
    /// Strobe falling edge
    pub start: u64,
    /// Strobe rising edge
    pub end: u64,
    pub direction: Direction,
    /// 5-bit register address: DA0..DA2, CS0, CS1
    pub address: u8,
    /// 16 bits for the DATA register, low 8 bits otherwise
    pub value: u16,
}

impl BusAccess {
    pub fn new(start: u64, end: u64, direction: Direction, address: u8, value: u16) -> Self {
        Self {
            start,
            end,
            direction,
            address,
            value,
        }
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        self.direction == Direction::Write
    }
}

/// Annotation class of an emitted event
///
/// The order matches the annotation classes declared to a logic analyzer
/// host, see [`Category::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    DeviceSelection,
    RegisterWrite,
    RegisterRead,
    DataWrite,
    DataRead,
    Command,
    DataTransfer,
    Status,
    AtapiCommand,
    Anomaly,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::DeviceSelection,
        Category::RegisterWrite,
        Category::RegisterRead,
        Category::DataWrite,
        Category::DataRead,
        Category::Command,
        Category::DataTransfer,
        Category::Status,
        Category::AtapiCommand,
        Category::Anomaly,
    ];

    /// Annotation class index used by the host
    pub fn index(&self) -> usize {
        match self {
            Category::DeviceSelection => 0,
            Category::RegisterWrite => 1,
            Category::RegisterRead => 2,
            Category::DataWrite => 3,
            Category::DataRead => 4,
            Category::Command => 5,
            Category::DataTransfer => 6,
            Category::Status => 7,
            Category::AtapiCommand => 8,
            Category::Anomaly => 9,
        }
    }

    /// Annotation class id
    pub fn id(&self) -> &'static str {
        match self {
            Category::DeviceSelection => "device",
            Category::RegisterWrite => "regwr",
            Category::RegisterRead => "regrd",
            Category::DataWrite => "datawr",
            Category::DataRead => "datard",
            Category::Command => "cmd",
            Category::DataTransfer => "datatransfer",
            Category::Status => "status",
            Category::AtapiCommand => "atapi",
            Category::Anomaly => "event",
        }
    }

    /// Human readable description of the class
    pub fn description(&self) -> &'static str {
        match self {
            Category::DeviceSelection => "Selected device",
            Category::RegisterWrite => "Register writes",
            Category::RegisterRead => "Register reads",
            Category::DataWrite => "Data writes",
            Category::DataRead => "Data reads",
            Category::Command => "Commands",
            Category::DataTransfer => "Data transfers",
            Category::Status => "Device status",
            Category::AtapiCommand => "ATAPI commands",
            Category::Anomaly => "Other events",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Structured payload of a protocol event.
///
/// Names resolved from lookup tables are `None` when the table has no entry;
/// rendering turns that into an "(unknown)" placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Span during which `device` was the addressed target
    DeviceSelected { device: u8 },
    RegisterWrite {
        address: u8,
        register: Option<String>,
        value: u8,
    },
    RegisterRead {
        address: u8,
        register: Option<String>,
        value: u8,
    },
    DataWrite { value: u16 },
    DataRead { value: u16 },
    Command {
        opcode: u8,
        mnemonic: Option<String>,
    },
    AtapiCommand {
        opcode: u8,
        mnemonic: Option<String>,
    },
    /// Run of consecutive DATA register accesses in one direction
    DataTransfer { direction: Direction, words: u32 },
    /// Status (or alternate status) value held while it was polled
    Status { value: u8 },
    /// Both strobes low with every other bus line low: the capture lost data
    CaptureOverflow,
    /// Short data bus pulse while DATA_SEL routes the bus to the control mux
    ControlMuxWrite { value: u16 },
}

impl EventKind {
    pub fn category(&self) -> Category {
        match self {
            EventKind::DeviceSelected { .. } => Category::DeviceSelection,
            EventKind::RegisterWrite { .. } => Category::RegisterWrite,
            EventKind::RegisterRead { .. } => Category::RegisterRead,
            EventKind::DataWrite { .. } => Category::DataWrite,
            EventKind::DataRead { .. } => Category::DataRead,
            EventKind::Command { .. } => Category::Command,
            EventKind::AtapiCommand { .. } => Category::AtapiCommand,
            EventKind::DataTransfer { .. } => Category::DataTransfer,
            EventKind::Status { .. } => Category::Status,
            EventKind::CaptureOverflow | EventKind::ControlMuxWrite { .. } => Category::Anomaly,
        }
    }
}

/// A finished, time-bounded protocol event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolEvent {
    pub start: u64,
    pub end: u64,
    pub kind: EventKind,
}

impl ProtocolEvent {
    pub fn new(start: u64, end: u64, kind: EventKind) -> Self {
        debug_assert!(start <= end, "event ends before it starts");
        Self { start, end, kind }
    }

    pub fn category(&self) -> Category {
        self.kind.category()
    }
}
