use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use nvb_types::{Descriptor, ItemId};

use crate::entry::{IndexEntry, INDEX_ENTRY_LEN, ITEM_CRC_LEN};
use crate::error::{ImageError, ImageResult, SizeLimit};
use crate::header::{ImageHeader, Partition, CRC_START, ERASED_BYTE, FORMAT_VERSION, HEADER_LEN};

/// Largest addressable item area: offsets are 16-bit.
pub const MAX_ITEM_AREA: usize = 64 * 1024;

/// Raw per-item payloads produced by the item compiler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledItems {
    payloads: BTreeMap<ItemId, Vec<u8>>,
}

impl CompiledItems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: ItemId, payload: Vec<u8>) -> Option<Vec<u8>> {
        self.payloads.insert(id, payload)
    }

    pub fn get(&self, id: ItemId) -> Option<&[u8]> {
        self.payloads.get(&id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.payloads.keys().copied()
    }
}

impl FromIterator<(ItemId, Vec<u8>)> for CompiledItems {
    fn from_iter<I: IntoIterator<Item = (ItemId, Vec<u8>)>>(iter: I) -> Self {
        Self {
            payloads: iter.into_iter().collect(),
        }
    }
}

/// Per-run image parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageParams {
    /// Exact size of every produced image.
    pub flash_size: u32,
    /// Version magic recorded in the header.
    pub ver_magic: u32,
    /// Sequence number recorded in the header.
    pub seq: u32,
    /// A finished image must be strictly smaller than this.
    pub max_image_size: u32,
}

impl Default for ImageParams {
    fn default() -> Self {
        Self {
            flash_size: 4096,
            ver_magic: 0,
            seq: 0,
            max_image_size: MAX_ITEM_AREA as u32,
        }
    }
}

impl ImageParams {
    /// Check the size budget of a finished image of `len` bytes.
    pub fn check_image_len(&self, len: usize) -> ImageResult<()> {
        let max = self.max_image_size as usize;
        if len >= max {
            return Err(ImageError::SizeExceeded {
                limit: SizeLimit::ImageSize,
                required: len,
                max: max.saturating_sub(1),
            });
        }
        Ok(())
    }
}

/// A finished image. Immutable once assembled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    partition: Partition,
    header: ImageHeader,
    entries: Vec<IndexEntry>,
    bytes: Vec<u8>,
}

impl Image {
    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// End of the last item block; everything from here on is padding.
    pub fn used_len(&self) -> usize {
        self.entries
            .iter()
            .map(IndexEntry::block_end)
            .max()
            .unwrap_or(HEADER_LEN + self.entries.len() * INDEX_ENTRY_LEN)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Builds factory and normal images from a descriptor and the compiled
/// payloads of its items.
///
/// The assembler takes ownership of the payloads once and can then build
/// any number of partitions from them.
#[derive(Debug)]
pub struct ImageAssembler {
    compiled: CompiledItems,
    params: ImageParams,
}

impl ImageAssembler {
    pub fn new(compiled: CompiledItems, params: ImageParams) -> Self {
        Self { compiled, params }
    }

    pub fn params(&self) -> &ImageParams {
        &self.params
    }

    /// Build one partition's image.
    ///
    /// Nothing is returned unless every selected item has a payload, every
    /// id and length fits its index field, and the result fits both the
    /// item area and the flash size.
    pub fn assemble(&self, descriptor: &Descriptor, partition: Partition) -> ImageResult<Image> {
        let (mut ids, keep_ids) = select(descriptor, partition);
        ids.sort_unstable();
        if let Some(pair) = ids.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(ImageError::DuplicateItem { id: pair[0] });
        }

        let item_count = ids.len();
        let mut offset = HEADER_LEN + item_count * INDEX_ENTRY_LEN;
        let mut entries = Vec::with_capacity(item_count);
        let mut section = Vec::new();

        for &id in &ids {
            let id_byte = narrow_id(id)?;
            let payload = self
                .compiled
                .get(id)
                .ok_or(ImageError::MissingPayload { id })?;
            let len = u8::try_from(payload.len()).map_err(|_| ImageError::LengthOutOfRange {
                id,
                len: payload.len(),
            })?;
            let entry_offset = u16::try_from(offset).map_err(|_| ImageError::SizeExceeded {
                limit: SizeLimit::ItemArea,
                required: offset,
                max: MAX_ITEM_AREA,
            })?;

            section.extend_from_slice(payload);
            section.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
            entries.push(IndexEntry {
                id: id_byte,
                len,
                offset: entry_offset,
            });
            offset += payload.len() + ITEM_CRC_LEN;
        }

        let used = offset;
        if used > MAX_ITEM_AREA {
            return Err(ImageError::SizeExceeded {
                limit: SizeLimit::ItemArea,
                required: used,
                max: MAX_ITEM_AREA,
            });
        }
        let flash_size = self.params.flash_size as usize;
        if used > flash_size {
            return Err(ImageError::SizeExceeded {
                limit: SizeLimit::FlashSize,
                required: used,
                max: flash_size,
            });
        }

        let keep_range = match (keep_ids.iter().min(), keep_ids.iter().max()) {
            (Some(&lo), Some(&hi)) => (narrow_id(lo)?, narrow_id(hi)?),
            _ => (0, 0),
        };

        let mut header = ImageHeader {
            magic: partition.magic(),
            crc: 0,
            version: FORMAT_VERSION,
            header_len: HEADER_LEN as u8,
            item_count: u16::try_from(item_count).map_err(|_| ImageError::SizeExceeded {
                limit: SizeLimit::ItemArea,
                required: used,
                max: MAX_ITEM_AREA,
            })?,
            seq: self.params.seq,
            ver_magic: self.params.ver_magic,
            flash_size: self.params.flash_size,
            keep_range,
            reserved: [0, 0],
        };

        // erased flash everywhere past the item blocks
        let mut bytes = vec![ERASED_BYTE; flash_size];
        bytes[..HEADER_LEN].copy_from_slice(&header.to_bytes());
        let mut pos = HEADER_LEN;
        for entry in &entries {
            bytes[pos..pos + INDEX_ENTRY_LEN].copy_from_slice(&entry.to_bytes());
            pos += INDEX_ENTRY_LEN;
        }
        bytes[pos..pos + section.len()].copy_from_slice(&section);

        header.crc = crc32fast::hash(&bytes[CRC_START..]);
        bytes[4..CRC_START].copy_from_slice(&header.crc.to_le_bytes());

        info!(
            %partition,
            items = item_count,
            used,
            flash_size,
            keep_lo = keep_range.0,
            keep_hi = keep_range.1,
            "assembled image"
        );

        Ok(Image {
            partition,
            header,
            entries,
            bytes,
        })
    }
}

/// Ids of the items a partition holds, plus the ids of the `Keep` group
/// (normal partition only).
fn select(descriptor: &Descriptor, partition: Partition) -> (Vec<ItemId>, Vec<ItemId>) {
    let mut ids = Vec::new();
    let mut keep = Vec::new();
    for (group, item) in descriptor.items() {
        match partition {
            Partition::Factory if group.is_factory() => ids.push(item.id),
            Partition::Normal if !group.is_factory() => {
                ids.push(item.id);
                if group.is_keep() {
                    keep.push(item.id);
                }
            }
            _ => {}
        }
    }
    (ids, keep)
}

fn narrow_id(id: ItemId) -> ImageResult<u8> {
    u8::try_from(id.get()).map_err(|_| ImageError::IdOutOfRange { id })
}
