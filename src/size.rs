//! Human-readable size strings for share images.
//!
//! Every unit suffix is a binary multiple: `10M`, `10MB` and `10MiB` all mean
//! 10 × 2^20 bytes. This matches the raw-image tooling that mounts the shares,
//! so the size a user asks for is the size `ls -l` reports.

use std::fmt;
use std::str::FromStr;

use strum::{Display, EnumIter, IntoEnumIterator};

use crate::error::{Result, ShareError};

/// Size unit accepted after the number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum SizeUnit {
    #[strum(serialize = "T")]
    Tebi,
    #[strum(serialize = "G")]
    Gibi,
    #[strum(serialize = "M")]
    Mebi,
    #[strum(serialize = "K")]
    Kibi,
    #[strum(serialize = "B")]
    Byte,
}

impl SizeUnit {
    /// Number of bytes in one unit.
    pub fn multiplier(self) -> u64 {
        match self {
            Self::Tebi => 1 << 40,
            Self::Gibi => 1 << 30,
            Self::Mebi => 1 << 20,
            Self::Kibi => 1 << 10,
            Self::Byte => 1,
        }
    }

    /// Map a suffix (case-insensitive, surrounding whitespace already trimmed)
    /// to a unit. An empty suffix means bytes.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix.to_ascii_lowercase().as_str() {
            "" | "b" => Some(Self::Byte),
            "k" | "kb" | "kib" => Some(Self::Kibi),
            "m" | "mb" | "mib" => Some(Self::Mebi),
            "g" | "gb" | "gib" => Some(Self::Gibi),
            "t" | "tb" | "tib" => Some(Self::Tebi),
            _ => None,
        }
    }
}

/// A byte count parsed from (or rendered as) a size string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(u64);

impl ByteSize {
    pub const fn from_bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn mib(n: u64) -> Self {
        Self(n << 20)
    }

    pub const fn bytes(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0B");
        }
        // Largest unit that divides the value exactly
        for unit in SizeUnit::iter() {
            let mult = unit.multiplier();
            if self.0 % mult == 0 {
                return write!(f, "{}{}", self.0 / mult, unit);
            }
        }
        write!(f, "{}B", self.0)
    }
}

impl FromStr for ByteSize {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self> {
        parse_size(s)
    }
}

/// Parse a human-readable size such as `10M`, `1.5G`, `512 KiB` or `4096`.
///
/// Fractions are truncated to whole bytes. Zero, negative values, unknown
/// suffixes and values that overflow `u64` are rejected.
pub fn parse_size(input: &str) -> Result<ByteSize> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ShareError::invalid_size("size is empty"));
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);

    if number.is_empty() {
        return Err(ShareError::invalid_size(format!("'{}' does not start with a number", input)));
    }

    let unit = SizeUnit::from_suffix(suffix.trim())
        .ok_or_else(|| ShareError::invalid_size(format!("unknown unit in '{}'", input)))?;

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return Err(ShareError::invalid_size(format!("malformed number in '{}'", input)));
    }

    let overflow = || ShareError::invalid_size(format!("'{}' is too large", input));
    let mult = unit.multiplier();

    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| overflow())?
    };
    let mut bytes = whole.checked_mul(mult).ok_or_else(overflow)?;

    if !fraction.is_empty() {
        // 18 digits keep numerator * multiplier well inside u128
        let digits = &fraction[..fraction.len().min(18)];
        let numerator: u128 = digits.parse().map_err(|_| overflow())?;
        let denominator = 10u128.pow(digits.len() as u32);
        let extra = (numerator * u128::from(mult) / denominator) as u64;
        bytes = bytes.checked_add(extra).ok_or_else(overflow)?;
    }

    if bytes == 0 {
        return Err(ShareError::invalid_size(format!("'{}' must be greater than zero", input)));
    }

    Ok(ByteSize(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_megabytes_is_binary() {
        assert_eq!(parse_size("10M").unwrap().bytes(), 10 * 1024 * 1024);
        assert_eq!(parse_size("10MB").unwrap().bytes(), 10 * 1024 * 1024);
        assert_eq!(parse_size("10MiB").unwrap().bytes(), 10 * 1024 * 1024);
        assert_eq!(parse_size("10m").unwrap().bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_parse_all_units() {
        assert_eq!(parse_size("4096").unwrap().bytes(), 4096);
        assert_eq!(parse_size("4096B").unwrap().bytes(), 4096);
        assert_eq!(parse_size("2K").unwrap().bytes(), 2048);
        assert_eq!(parse_size("1G").unwrap().bytes(), 1 << 30);
        assert_eq!(parse_size("1T").unwrap().bytes(), 1 << 40);
    }

    #[test]
    fn test_parse_whitespace_and_fraction() {
        assert_eq!(parse_size(" 512 KiB ").unwrap().bytes(), 512 * 1024);
        assert_eq!(parse_size("1.5G").unwrap().bytes(), 3 << 29);
        assert_eq!(parse_size(".5K").unwrap().bytes(), 512);
        // sub-byte remainder is dropped
        assert_eq!(parse_size("1.0001K").unwrap().bytes(), 1024);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "   ", "M", "abc", "-10M", "10Q", "10 MBs", "1.2.3M", ".", "0", "0M"] {
            assert!(parse_size(bad).is_err(), "'{}' should be rejected", bad);
        }
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(parse_size("99999999999999999999").is_err());
        assert!(parse_size("20000000T").is_err());
    }

    #[test]
    fn test_display_uses_largest_exact_unit() {
        assert_eq!(ByteSize::mib(10).to_string(), "10M");
        assert_eq!(ByteSize::from_bytes(1536).to_string(), "1536B");
        assert_eq!(ByteSize::from_bytes(3072).to_string(), "3K");
        assert_eq!(ByteSize::from_bytes(1 << 30).to_string(), "1G");
        assert_eq!(ByteSize::from_bytes(123).to_string(), "123B");
        assert_eq!(ByteSize::from_bytes(0).to_string(), "0B");
    }

    #[test]
    fn test_from_str() {
        let size: ByteSize = "8M".parse().unwrap();
        assert_eq!(size, ByteSize::mib(8));
    }
}
