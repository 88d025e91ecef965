use serde::{Deserialize, Serialize};

use crate::device::DeviceSet;
use crate::id::{GroupId, ItemId};

/// Items in this group go into the factory image only.
pub const FACTORY_GROUP: &str = "Factory";

/// The identifier range of this group's items is recorded in the normal
/// image header so an upgrade knows what to preserve.
pub const KEEP_GROUP: &str = "Keep";

/// Root element name used when a descriptor is built in memory.
pub const DEFAULT_ROOT: &str = "HISTUDIO";

/// A single keyed configuration parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    /// Raw `PARAM_VALUE` text; interpreted only by the item compiler.
    pub value: Option<String>,
    /// Products this item applies to; empty means all.
    pub devices: DeviceSet,
    /// Remaining source attributes, in source order.
    pub attributes: Vec<(String, String)>,
}

impl Item {
    pub fn new(id: u32, value: impl Into<String>) -> Self {
        Self {
            id: ItemId::new(id),
            value: Some(value.into()),
            devices: DeviceSet::all(),
            attributes: Vec::new(),
        }
    }

    pub fn with_devices(mut self, devices: DeviceSet) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Look up a preserved attribute by name.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A named, numerically keyed set of items in source order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub id: GroupId,
    pub items: Vec<Item>,
    /// Remaining source attributes, in source order.
    pub attributes: Vec<(String, String)>,
}

impl Group {
    pub fn new(name: impl Into<String>, id: u32) -> Self {
        Self {
            name: name.into(),
            id: GroupId::new(id),
            items: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn is_factory(&self) -> bool {
        self.name == FACTORY_GROUP
    }

    pub fn is_keep(&self) -> bool {
        self.name == KEEP_GROUP
    }
}

/// The group → item tree at one pipeline stage.
///
/// Every stage returns a fresh `Descriptor`; none modifies its input.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Name of the document's root element, preserved for write-back.
    pub root: String,
    pub groups: Vec<Group>,
}

impl Default for Descriptor {
    fn default() -> Self {
        Self {
            root: DEFAULT_ROOT.to_string(),
            groups: Vec::new(),
        }
    }
}

impl Descriptor {
    pub fn new(groups: Vec<Group>) -> Self {
        Self {
            groups,
            ..Default::default()
        }
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Every item with its owning group, in document order.
    pub fn items(&self) -> impl Iterator<Item = (&Group, &Item)> {
        self.groups
            .iter()
            .flat_map(|g| g.items.iter().map(move |item| (g, item)))
    }

    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items().map(|(_, item)| item).find(|item| item.id == id)
    }

    pub fn item_count(&self) -> usize {
        self.groups.iter().map(|g| g.items.len()).sum()
    }

    pub fn item_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items().map(|(_, item)| item.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Descriptor {
        Descriptor::new(vec![
            Group::new(FACTORY_GROUP, 1).with_item(Item::new(0x01, "1")),
            Group::new(KEEP_GROUP, 2)
                .with_item(Item::new(0x80, "a"))
                .with_item(Item::new(0x81, "b")),
            Group::new("Empty", 3),
        ])
    }

    #[test]
    fn items_walk_in_document_order() {
        let d = sample();
        let ids: Vec<u32> = d.item_ids().map(ItemId::get).collect();
        assert_eq!(ids, vec![0x01, 0x80, 0x81]);
        assert_eq!(d.item_count(), 3);
    }

    #[test]
    fn lookup_by_id_and_group() {
        let d = sample();
        assert_eq!(d.item(ItemId::new(0x81)).unwrap().value.as_deref(), Some("b"));
        assert!(d.item(ItemId::new(0x99)).is_none());
        assert!(d.group(FACTORY_GROUP).unwrap().is_factory());
        assert!(d.group(KEEP_GROUP).unwrap().is_keep());
        assert!(d.group("Missing").is_none());
    }

    #[test]
    fn attribute_lookup() {
        let item = Item::new(1, "v").with_attribute("PARAM_NAME", "foo");
        assert_eq!(item.attribute("PARAM_NAME"), Some("foo"));
        assert_eq!(item.attribute("OTHER"), None);
    }

    #[test]
    fn default_root_name() {
        assert_eq!(Descriptor::default().root, DEFAULT_ROOT);
    }
}
