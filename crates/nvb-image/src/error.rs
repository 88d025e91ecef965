use std::fmt;

use thiserror::Error;

use nvb_types::ItemId;

/// Which size budget an image exceeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeLimit {
    /// Header + index + item blocks must fit the 64 KiB addressable area.
    ItemArea,
    /// Header + index + item blocks must fit the target flash size.
    FlashSize,
    /// A finished image must stay below the configured maximum image size.
    ImageSize,
}

impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ItemArea => "item area",
            Self::FlashSize => "flash size",
            Self::ImageSize => "image size",
        })
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("no compiled payload for item {id}")]
    MissingPayload { id: ItemId },

    #[error("{limit} exceeded: need {required} bytes, limit is {max} bytes")]
    SizeExceeded {
        limit: SizeLimit,
        required: usize,
        max: usize,
    },

    #[error("item id {id} does not fit the 1-byte index field")]
    IdOutOfRange { id: ItemId },

    #[error("item {id} payload is {len} bytes, more than the 1-byte length field allows")]
    LengthOutOfRange { id: ItemId, len: usize },

    #[error("item id {id} selected more than once")]
    DuplicateItem { id: ItemId },

    #[error("invalid image magic: {actual:#010x}")]
    InvalidMagic { actual: u32 },

    #[error("image checksum mismatch: header says {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("CRC32 mismatch for item {id:#04x}")]
    ItemChecksumMismatch { id: u8 },

    #[error("corrupt image at offset {offset}: {reason}")]
    Corrupt { offset: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ImageResult<T> = Result<T, ImageError>;
