use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Canonical identifier of an NV item.
///
/// Source descriptors and override files write identifiers either as decimal
/// (`31`) or hex-prefixed (`0x1F`) text. Both normalize to the same `ItemId`,
/// whose canonical text form is lowercase hex with a `0x` prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u32);

impl ItemId {
    /// Wrap a raw numeric identifier.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The numeric value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Parse decimal or `0x`-prefixed hex text.
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        parse_number(text, 10).map(Self)
    }

    /// Canonical text form, e.g. `0x1f`.
    pub fn to_canonical(self) -> String {
        format!("{:#x}", self.0)
    }
}

impl fmt::Debug for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ItemId({:#x})", self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<u32> for ItemId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Numeric sort key of a group.
///
/// Group keys are always written in hex, with or without the `0x` prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(u32);

impl GroupId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Parse hex text (`0x1`, `1F`).
    pub fn parse(text: &str) -> Result<Self, TypeError> {
        parse_number(text, 16).map(Self)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Parse an unsigned number. A `0x`/`0X` prefix always means hex;
/// unprefixed text uses `default_radix`.
fn parse_number(text: &str, default_radix: u32) -> Result<u32, TypeError> {
    let trimmed = text.trim();
    let (digits, radix) = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => (hex, 16),
        None => (trimmed, default_radix),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(TypeError::InvalidId(text.to_string()));
    }
    u32::from_str_radix(digits, radix).map_err(|_| TypeError::IdOverflow(text.to_string()))
}
