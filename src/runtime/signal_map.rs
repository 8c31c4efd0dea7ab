//! Mapping of captured bits to named signal lines
//!
//! A [`SignalMap`] is an ordered list of [`SignalDef`]s. The order is the
//! display order used by the VCD writer; decoding only cares about bit offsets.

use crate::{Result, SniffError};

/// One named line or bus within a captured signal vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDef {
    /// Offset of the least significant bit
    pub bit: u32,
    /// Number of bits (1 for a single line)
    pub width: u32,
    /// Signal name, e.g. "DIOW" or "DATA"
    pub name: String,
    /// Short identifier used by the VCD format
    pub symbol: String,
}

impl SignalDef {
    pub fn new(bit: u32, width: u32, name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            bit,
            width,
            name: name.into(),
            symbol: symbol.into(),
        }
    }
}

/// Validated description of a capture's signal vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMap {
    signals: Vec<SignalDef>,
    width: u32,
}

impl SignalMap {
    /// Build a signal map, checking that the bit ranges neither overlap nor
    /// leave gaps, and that symbols are unique.
    pub fn new(signals: Vec<SignalDef>) -> Result<Self> {
        if signals.is_empty() {
            return Err(SniffError::InvalidSignalMap("no signals defined".to_string()));
        }

        let mut by_bit: Vec<&SignalDef> = signals.iter().collect();
        by_bit.sort_by_key(|s| s.bit);

        let mut next_bit = 0u32;
        for def in &by_bit {
            if def.width == 0 {
                return Err(SniffError::InvalidSignalMap(format!(
                    "signal '{}' has zero width",
                    def.name
                )));
            }
            if def.bit < next_bit {
                return Err(SniffError::InvalidSignalMap(format!(
                    "signal '{}' at bit {} overlaps the previous signal",
                    def.name, def.bit
                )));
            }
            if def.bit > next_bit {
                return Err(SniffError::InvalidSignalMap(format!(
                    "bits {}..{} are not covered by any signal",
                    next_bit, def.bit
                )));
            }
            next_bit = def.bit + def.width;
        }

        if next_bit > 64 {
            return Err(SniffError::InvalidSignalMap(format!(
                "total width {} exceeds 64 bits",
                next_bit
            )));
        }

        for (i, def) in signals.iter().enumerate() {
            if signals[..i].iter().any(|other| other.symbol == def.symbol) {
                return Err(SniffError::InvalidSignalMap(format!(
                    "duplicate symbol '{}'",
                    def.symbol
                )));
            }
        }

        Ok(Self {
            signals,
            width: next_bit,
        })
    }

    /// ZuluIDE RP2350 sniffer pinout with every line as its own 1-bit signal.
    ///
    /// Having each signal be 1 bit lets PulseView assign the parallel ATA
    /// decoder channels automatically.
    pub fn rp2350() -> Self {
        let mut signals = vec![
            SignalDef::new(0, 1, "DIOW", "W"),
            SignalDef::new(1, 1, "DIOR", "R"),
            SignalDef::new(2, 1, "DA0", "A0"),
            SignalDef::new(3, 1, "DA1", "A1"),
            SignalDef::new(4, 1, "DA2", "A2"),
            SignalDef::new(5, 1, "CS0", "C0"),
            SignalDef::new(6, 1, "CS1", "C1"),
            SignalDef::new(7, 1, "DMACK", "D"),
        ];
        signals.extend(
            (0..16).map(|i| SignalDef::new(8 + i, 1, format!("D{}", i), format!("d{}", i))),
        );
        signals.extend([
            SignalDef::new(24, 1, "DATA_SEL", "s"),
            SignalDef::new(25, 1, "DATA_DIR", "r"),
            SignalDef::new(26, 1, "IORDY", "i"),
        ]);
        Self {
            signals,
            width: 27,
        }
    }

    /// Same pinout with the address and data lines grouped into buses
    pub fn rp2350_grouped() -> Self {
        Self {
            signals: vec![
                SignalDef::new(0, 1, "DIOW", "W"),
                SignalDef::new(1, 1, "DIOR", "R"),
                SignalDef::new(2, 3, "DA", "A"),
                SignalDef::new(5, 1, "CS0", "c"),
                SignalDef::new(6, 1, "CS1", "C"),
                SignalDef::new(7, 1, "DMACK", "D"),
                SignalDef::new(8, 16, "DATA", "d"),
                SignalDef::new(24, 1, "DATA_SEL", "s"),
                SignalDef::new(25, 1, "DATA_DIR", "r"),
                SignalDef::new(26, 1, "IORDY", "i"),
            ],
            width: 27,
        }
    }

    /// Signals in declaration (display) order
    pub fn signals(&self) -> &[SignalDef] {
        &self.signals
    }

    /// Total number of bits in a signal vector
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Look up a signal by name
    pub fn get(&self, name: &str) -> Option<&SignalDef> {
        self.signals.iter().find(|s| s.name == name)
    }

    /// Find the bit offset of a single line.
    ///
    /// Tries an exact 1-bit signal named `line` first, then bit `index` of
    /// the bus named `bus`, so both the flat and grouped pinouts resolve.
    pub fn locate(&self, line: &str, bus: &str, index: u32) -> Option<u32> {
        if let Some(def) = self.get(line)
            && def.width == 1
        {
            return Some(def.bit);
        }
        self.get(bus)
            .filter(|def| index < def.width)
            .map(|def| def.bit + index)
    }
}

impl Default for SignalMap {
    fn default() -> Self {
        Self::rp2350()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_maps_validate() {
        for map in [SignalMap::rp2350(), SignalMap::rp2350_grouped()] {
            let rebuilt = SignalMap::new(map.signals().to_vec()).unwrap();
            assert_eq!(rebuilt.width(), 27);
            assert_eq!(rebuilt, map);
        }
    }

    #[test]
    fn test_overlap_rejected() {
        let result = SignalMap::new(vec![
            SignalDef::new(0, 2, "A", "a"),
            SignalDef::new(1, 1, "B", "b"),
        ]);
        assert!(matches!(result, Err(SniffError::InvalidSignalMap(_))));
    }

    #[test]
    fn test_gap_rejected() {
        let result = SignalMap::new(vec![
            SignalDef::new(0, 1, "A", "a"),
            SignalDef::new(2, 1, "B", "b"),
        ]);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("not covered"));
    }

    #[test]
    fn test_duplicate_symbol_rejected() {
        let result = SignalMap::new(vec![
            SignalDef::new(0, 1, "A", "x"),
            SignalDef::new(1, 1, "B", "x"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_too_wide_rejected() {
        let result = SignalMap::new(vec![
            SignalDef::new(0, 60, "A", "a"),
            SignalDef::new(60, 8, "B", "b"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_declaration_order_is_free() {
        let map = SignalMap::new(vec![
            SignalDef::new(1, 1, "B", "b"),
            SignalDef::new(0, 1, "A", "a"),
        ])
        .unwrap();
        assert_eq!(map.signals()[0].name, "B");
        assert_eq!(map.width(), 2);
    }

    #[test]
    fn test_locate_flat_and_grouped() {
        let flat = SignalMap::rp2350();
        let grouped = SignalMap::rp2350_grouped();

        assert_eq!(flat.locate("D15", "DATA", 15), Some(23));
        assert_eq!(grouped.locate("D15", "DATA", 15), Some(23));
        assert_eq!(flat.locate("DA2", "DA", 2), Some(4));
        assert_eq!(grouped.locate("DA2", "DA", 2), Some(4));
        assert_eq!(grouped.locate("DA3", "DA", 3), None);
        assert_eq!(flat.locate("NOPE", "NOPE", 0), None);
    }
}
