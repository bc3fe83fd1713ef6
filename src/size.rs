//! Byte sizes with binary-unit rendering and parsing
//!
//! Sizes are stored as plain bytes. `"10 MiB".parse::<Size>()` and
//! `Size::mib(10)` are equivalent.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const UNITS: [(&str, u64); 7] = [
    ("EiB", 1 << 60),
    ("PiB", 1 << 50),
    ("TiB", 1 << 40),
    ("GiB", 1 << 30),
    ("MiB", 1 << 20),
    ("KiB", 1 << 10),
    ("B", 1),
];

/// A size in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(u64);

impl Size {
    pub const ZERO: Size = Size(0);

    pub const fn bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    /// Binary-unit constructors saturate at `u64::MAX` bytes.
    pub const fn kib(n: u64) -> Self {
        Self(n.saturating_mul(1 << 10))
    }

    pub const fn mib(n: u64) -> Self {
        Self(n.saturating_mul(1 << 20))
    }

    pub const fn gib(n: u64) -> Self {
        Self(n.saturating_mul(1 << 30))
    }

    pub const fn as_bytes(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Size {
    /// Renders with the largest unit that divides the size exactly,
    /// falling back to two decimals in the largest unit not exceeding it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0 B");
        }
        for (name, factor) in UNITS {
            if self.0 >= factor {
                if self.0 % factor == 0 {
                    return write!(f, "{} {}", self.0 / factor, name);
                }
                return write!(f, "{:.2} {}", self.0 as f64 / factor as f64, name);
            }
        }
        write!(f, "{} B", self.0)
    }
}

/// Errors from parsing a size spec such as `"512 MiB"`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeParseError {
    #[error("empty size spec")]
    Empty,

    #[error("invalid number in size spec '{0}'")]
    Number(String),

    #[error("unknown unit '{0}'")]
    Unit(String),

    #[error("size spec '{0}' overflows")]
    Overflow(String),
}

impl FromStr for Size {
    type Err = SizeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        if spec.is_empty() {
            return Err(SizeParseError::Empty);
        }

        let split = spec
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(spec.len());
        let (number, unit) = spec.split_at(split);
        let value: u64 = number
            .parse()
            .map_err(|_| SizeParseError::Number(spec.to_string()))?;

        let unit = unit.trim();
        let factor = if unit.is_empty() {
            1
        } else {
            UNITS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(unit))
                .map(|(_, factor)| *factor)
                .ok_or_else(|| SizeParseError::Unit(unit.to_string()))?
        };

        value
            .checked_mul(factor)
            .map(Size)
            .ok_or_else(|| SizeParseError::Overflow(spec.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("10 MiB".parse::<Size>(), Ok(Size::mib(10)));
        assert_eq!("4GiB".parse::<Size>(), Ok(Size::gib(4)));
        assert_eq!("512".parse::<Size>(), Ok(Size::bytes(512)));
        assert_eq!("2 kib".parse::<Size>(), Ok(Size::kib(2)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Size>(), Err(SizeParseError::Empty));
        assert!(matches!("MiB".parse::<Size>(), Err(SizeParseError::Number(_))));
        assert!(matches!("3 furlongs".parse::<Size>(), Err(SizeParseError::Unit(_))));
        assert!(matches!("99999 EiB".parse::<Size>(), Err(SizeParseError::Overflow(_))));
    }

    #[test]
    fn test_display() {
        assert_eq!(Size::ZERO.to_string(), "0 B");
        assert_eq!(Size::mib(512).to_string(), "512 MiB");
        assert_eq!(Size::gib(2).to_string(), "2 GiB");
        assert_eq!(Size::bytes(1536).to_string(), "1.50 KiB");
    }

    #[test]
    fn test_unit_constructors_saturate() {
        assert_eq!(Size::gib(1 << 34), Size::bytes(u64::MAX));
        assert_eq!(Size::kib(u64::MAX), Size::bytes(u64::MAX));
        assert_eq!(Size::gib(1), Size::bytes(1 << 30));
    }

    #[test]
    fn test_ordering() {
        assert!(Size::mib(1) < Size::gib(1));
        assert!(Size::ZERO.is_zero());
    }
}
