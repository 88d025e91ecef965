use std::path::Path;

use crate::entry::{IndexEntry, INDEX_ENTRY_LEN, ITEM_CRC_LEN};
use crate::error::{ImageError, ImageResult};
use crate::header::{ImageHeader, Partition, CRC_START, HEADER_LEN};

/// Parses and verifies a finished image.
///
/// Construction checks the header, the whole-image CRC, and that every
/// index entry points inside the image. Per-item CRCs are checked on
/// access and by [`ImageReader::verify`].
#[derive(Debug)]
pub struct ImageReader {
    bytes: Vec<u8>,
    header: ImageHeader,
    partition: Partition,
    entries: Vec<IndexEntry>,
}

impl ImageReader {
    /// Open from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> ImageResult<Self> {
        let header = ImageHeader::from_bytes(&bytes)?;
        let partition = header
            .partition()
            .ok_or(ImageError::InvalidMagic {
                actual: header.magic,
            })?;
        if usize::from(header.header_len) != HEADER_LEN {
            return Err(ImageError::Corrupt {
                offset: 9,
                reason: format!("unexpected header length {}", header.header_len),
            });
        }
        if header.flash_size as usize != bytes.len() {
            return Err(ImageError::Corrupt {
                offset: 20,
                reason: format!(
                    "header declares {} bytes, image has {}",
                    header.flash_size,
                    bytes.len()
                ),
            });
        }

        let actual = crc32fast::hash(&bytes[CRC_START..]);
        if actual != header.crc {
            return Err(ImageError::ChecksumMismatch {
                expected: header.crc,
                actual,
            });
        }

        let index_end = HEADER_LEN + usize::from(header.item_count) * INDEX_ENTRY_LEN;
        if index_end > bytes.len() {
            return Err(ImageError::Corrupt {
                offset: HEADER_LEN,
                reason: "index table extends beyond image".into(),
            });
        }
        let entries = bytes[HEADER_LEN..index_end]
            .chunks_exact(INDEX_ENTRY_LEN)
            .map(IndexEntry::from_bytes)
            .collect::<ImageResult<Vec<_>>>()?;
        for (i, entry) in entries.iter().enumerate() {
            if usize::from(entry.offset) < index_end || entry.block_end() > bytes.len() {
                return Err(ImageError::Corrupt {
                    offset: HEADER_LEN + i * INDEX_ENTRY_LEN,
                    reason: format!("item {:#04x} block out of bounds", entry.id),
                });
            }
        }

        Ok(Self {
            bytes,
            header,
            partition,
            entries,
        })
    }

    /// Open an image file from disk.
    pub fn open(path: &Path) -> ImageResult<Self> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn item_count(&self) -> usize {
        self.entries.len()
    }

    /// Read an item's payload by id, checking its CRC.
    pub fn read_item(&self, id: u8) -> ImageResult<Option<&[u8]>> {
        match self.entries.iter().find(|e| e.id == id) {
            Some(entry) => self.payload(entry).map(Some),
            None => Ok(None),
        }
    }

    /// Check every item's CRC.
    pub fn verify(&self) -> ImageResult<()> {
        for entry in &self.entries {
            self.payload(entry)?;
        }
        Ok(())
    }

    /// End of the last item block; everything from here on is padding.
    pub fn used_len(&self) -> usize {
        self.entries
            .iter()
            .map(IndexEntry::block_end)
            .max()
            .unwrap_or(HEADER_LEN + self.entries.len() * INDEX_ENTRY_LEN)
    }

    fn payload(&self, entry: &IndexEntry) -> ImageResult<&[u8]> {
        let start = usize::from(entry.offset);
        let end = start + usize::from(entry.len);
        let payload = &self.bytes[start..end];
        let stored = &self.bytes[end..end + ITEM_CRC_LEN];
        if stored != crc32fast::hash(payload).to_le_bytes() {
            return Err(ImageError::ItemChecksumMismatch { id: entry.id });
        }
        Ok(payload)
    }
}
