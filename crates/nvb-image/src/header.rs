use std::fmt;

use serde::Serialize;

use crate::error::{ImageError, ImageResult};

/// Magic of a normal (field) image: `HNV$` read little-endian.
pub const NORMAL_MAGIC: u32 = 0x2456_4E48;
/// Magic of a factory image: `FNV#` read little-endian.
pub const FACTORY_MAGIC: u32 = 0x2356_4E46;

pub const FORMAT_VERSION: u8 = 0;
pub const HEADER_LEN: usize = 28;
/// The whole-image CRC covers every byte from here to the end of flash.
pub const CRC_START: usize = 8;
/// Value of erased flash; fills everything past the item blocks.
pub const ERASED_BYTE: u8 = 0xFF;

/// The two image variants built for every deployment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Items retained only at manufacturing time (group `Factory`).
    Factory,
    /// Items retained through normal field operation (everything else).
    Normal,
}

impl Partition {
    pub const ALL: [Partition; 2] = [Partition::Factory, Partition::Normal];

    pub fn magic(self) -> u32 {
        match self {
            Self::Factory => FACTORY_MAGIC,
            Self::Normal => NORMAL_MAGIC,
        }
    }

    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            FACTORY_MAGIC => Some(Self::Factory),
            NORMAL_MAGIC => Some(Self::Normal),
            _ => None,
        }
    }

    /// Lowercase name, used in output file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Factory => "factory",
            Self::Normal => "normal",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed 28-byte image header. All multi-byte fields are little-endian.
///
/// | offset | size | field        |
/// |--------|------|--------------|
/// | 0      | 4    | magic        |
/// | 4      | 4    | crc          |
/// | 8      | 1    | version      |
/// | 9      | 1    | header_len   |
/// | 10     | 2    | item_count   |
/// | 12     | 4    | seq          |
/// | 16     | 4    | ver_magic    |
/// | 20     | 4    | flash_size   |
/// | 24     | 2    | keep_range   |
/// | 26     | 2    | reserved     |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ImageHeader {
    pub magic: u32,
    pub crc: u32,
    pub version: u8,
    pub header_len: u8,
    pub item_count: u16,
    pub seq: u32,
    pub ver_magic: u32,
    pub flash_size: u32,
    /// Lowest and highest identifier of the `Keep` group, (0, 0) if none.
    pub keep_range: (u8, u8),
    pub reserved: [u8; 2],
}

impl ImageHeader {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..8].copy_from_slice(&self.crc.to_le_bytes());
        buf[8] = self.version;
        buf[9] = self.header_len;
        buf[10..12].copy_from_slice(&self.item_count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.seq.to_le_bytes());
        buf[16..20].copy_from_slice(&self.ver_magic.to_le_bytes());
        buf[20..24].copy_from_slice(&self.flash_size.to_le_bytes());
        buf[24] = self.keep_range.0;
        buf[25] = self.keep_range.1;
        buf[26..28].copy_from_slice(&self.reserved);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> ImageResult<Self> {
        if data.len() < HEADER_LEN {
            return Err(ImageError::Corrupt {
                offset: 0,
                reason: format!("image shorter than header ({} bytes)", data.len()),
            });
        }
        Ok(Self {
            magic: le_u32(&data[0..4]),
            crc: le_u32(&data[4..8]),
            version: data[8],
            header_len: data[9],
            item_count: u16::from_le_bytes([data[10], data[11]]),
            seq: le_u32(&data[12..16]),
            ver_magic: le_u32(&data[16..20]),
            flash_size: le_u32(&data[20..24]),
            keep_range: (data[24], data[25]),
            reserved: [data[26], data[27]],
        })
    }

    /// The partition named by the magic, if it is a known one.
    pub fn partition(&self) -> Option<Partition> {
        Partition::from_magic(self.magic)
    }
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
