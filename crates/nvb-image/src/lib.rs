//! NV image format.
//!
//! An image is exactly `flash_size` bytes:
//!
//! - **Header** (28 bytes): magic, whole-image CRC32, version, item count,
//!   sequence number, version magic, flash size, keep-id range
//! - **Index table**: one 4-byte [`IndexEntry`] (id, len, offset) per item
//! - **Item blocks**: each payload followed by its CRC32
//! - **Padding**: `0xFF` to the end of flash
//!
//! Items are split across two images: [`Partition::Factory`] holds the
//! `Factory` group, [`Partition::Normal`] everything else.
//!
//! - [`ImageAssembler`]: builds images from a descriptor and compiled payloads
//! - [`ImageReader`]: parses and verifies a finished image

pub mod entry;
pub mod error;
pub mod header;
pub mod reader;
pub mod writer;

pub use entry::{IndexEntry, INDEX_ENTRY_LEN, ITEM_CRC_LEN};
pub use error::{ImageError, ImageResult, SizeLimit};
pub use header::{ImageHeader, Partition, FACTORY_MAGIC, HEADER_LEN, NORMAL_MAGIC};
pub use reader::ImageReader;
pub use writer::{CompiledItems, Image, ImageAssembler, ImageParams, MAX_ITEM_AREA};

#[cfg(test)]
mod tests {
    use super::*;
    use nvb_types::{Descriptor, Group, Item, ItemId, FACTORY_GROUP, KEEP_GROUP};

    fn split_fixture() -> (Descriptor, CompiledItems) {
        let d = Descriptor::new(vec![
            Group::new(FACTORY_GROUP, 1).with_item(Item::new(0x01, "")),
            Group::new(KEEP_GROUP, 2).with_item(Item::new(0x80, "")),
            Group::new("Misc", 3).with_item(Item::new(0x90, "")),
        ]);
        let items = [0x01u32, 0x80, 0x90]
            .into_iter()
            .map(|id| (ItemId::new(id), id.to_le_bytes().to_vec()))
            .collect();
        (d, items)
    }

    #[test]
    fn one_assembler_builds_both_partitions() {
        let (d, items) = split_fixture();
        let assembler = ImageAssembler::new(items, ImageParams::default());

        let factory = ImageReader::from_bytes(
            assembler.assemble(&d, Partition::Factory).unwrap().into_bytes(),
        )
        .unwrap();
        let normal = ImageReader::from_bytes(
            assembler.assemble(&d, Partition::Normal).unwrap().into_bytes(),
        )
        .unwrap();

        assert_eq!(factory.header().item_count, 1);
        assert!(factory.read_item(0x01).unwrap().is_some());
        assert_eq!(normal.header().item_count, 2);
        assert!(normal.read_item(0x80).unwrap().is_some());
        assert!(normal.read_item(0x90).unwrap().is_some());
        assert!(normal.read_item(0x01).unwrap().is_none());
        assert_eq!(normal.header().keep_range, (0x80, 0x80));
    }

    #[test]
    fn padding_runs_to_end_of_flash() {
        let (d, items) = split_fixture();
        let image = ImageAssembler::new(items, ImageParams::default())
            .assemble(&d, Partition::Normal)
            .unwrap();
        let used = image.used_len();
        assert!(image.as_bytes()[used..].iter().all(|&b| b == 0xFF));
        assert_eq!(image.len() - used, 4096 - (HEADER_LEN + 2 * INDEX_ENTRY_LEN + 2 * (4 + ITEM_CRC_LEN)));
    }
}
