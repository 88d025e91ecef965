use serde::Serialize;

use crate::error::{ImageError, ImageResult};

pub const INDEX_ENTRY_LEN: usize = 4;
/// Every item payload is followed by its CRC32, little-endian.
pub const ITEM_CRC_LEN: usize = 4;

/// One record of the index table that follows the header.
///
/// `offset` is measured from the start of the image and points at the
/// payload; the payload's CRC32 follows at `offset + len`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    pub id: u8,
    pub len: u8,
    pub offset: u16,
}

impl IndexEntry {
    pub fn to_bytes(&self) -> [u8; INDEX_ENTRY_LEN] {
        let offset = self.offset.to_le_bytes();
        [self.id, self.len, offset[0], offset[1]]
    }

    pub fn from_bytes(data: &[u8]) -> ImageResult<Self> {
        match data {
            [id, len, lo, hi, ..] => Ok(Self {
                id: *id,
                len: *len,
                offset: u16::from_le_bytes([*lo, *hi]),
            }),
            _ => Err(ImageError::Corrupt {
                offset: 0,
                reason: "truncated index entry".into(),
            }),
        }
    }

    /// End of this item's block, CRC included.
    pub fn block_end(&self) -> usize {
        usize::from(self.offset) + usize::from(self.len) + ITEM_CRC_LEN
    }
}
