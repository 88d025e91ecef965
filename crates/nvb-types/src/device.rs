use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Separator between tags in a source `DEV` attribute (`ASIC-FPGA`).
pub const DEVICE_SEPARATOR: char = '-';

/// The set of products an item applies to.
///
/// Tags are matched lowercased, so matching is case-insensitive. An empty
/// set means the item applies to every product. The text the set was parsed
/// from is kept so it can be written back as the author wrote it; equality
/// and hashing look at the tags only.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DeviceSet {
    tags: BTreeSet<String>,
    text: String,
}

impl DeviceSet {
    /// The empty set: applies everywhere.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a separator-delimited list. Blank segments are dropped.
    pub fn parse(text: &str) -> Self {
        let tags = text
            .split(DEVICE_SEPARATOR)
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_lowercase)
            .collect::<BTreeSet<_>>();
        let text = if tags.is_empty() {
            String::new()
        } else {
            text.trim().to_string()
        };
        Self { tags, text }
    }

    /// Whether an item carrying this set belongs in a build for `product`.
    pub fn applies_to(&self, product: &str) -> bool {
        self.tags.is_empty() || self.tags.contains(&product.trim().to_lowercase())
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(&tag.to_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Lowercased tags in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    /// The list as originally written, e.g. `ASIC-FPGA`.
    pub fn as_text(&self) -> &str {
        &self.text
    }
}

impl PartialEq for DeviceSet {
    fn eq(&self, other: &Self) -> bool {
        self.tags == other.tags
    }
}

impl Eq for DeviceSet {}

impl Hash for DeviceSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tags.hash(state);
    }
}

impl<S: AsRef<str>> FromIterator<S> for DeviceSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let tags: BTreeSet<String> = iter.into_iter().map(|s| s.as_ref().to_lowercase()).collect();
        let separator = DEVICE_SEPARATOR.to_string();
        let text = tags
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(separator.as_str());
        Self { tags, text }
    }
}

impl fmt::Display for DeviceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lowercases_and_splits() {
        let set = DeviceSet::parse("ASIC-FPGA");
        assert_eq!(set.len(), 2);
        assert!(set.contains("asic"));
        assert!(set.contains("FPGA"));
    }

    #[test]
    fn blank_means_all() {
        assert!(DeviceSet::parse("").is_empty());
        assert!(DeviceSet::parse(" - ").is_empty());
        assert!(DeviceSet::all().applies_to("anything"));
    }

    #[test]
    fn applies_to_member_tags_only() {
        let set: DeviceSet = ["A", "B"].into_iter().collect();
        assert!(set.applies_to("A"));
        assert!(set.applies_to("b"));
        assert!(!set.applies_to("C"));
    }

    #[test]
    fn display_keeps_source_text() {
        assert_eq!(DeviceSet::parse(" sta-ASIC ").to_string(), "sta-ASIC");
        assert_eq!(DeviceSet::parse(" - ").to_string(), "");
        assert_eq!(DeviceSet::all().to_string(), "");
    }

    #[test]
    fn collected_sets_join_sorted_tags() {
        let set: DeviceSet = ["STA", "asic"].into_iter().collect();
        assert_eq!(set.to_string(), "asic-sta");
    }

    #[test]
    fn equality_ignores_spelling() {
        assert_eq!(DeviceSet::parse("ASIC-FPGA"), DeviceSet::parse("fpga-asic"));
        assert_ne!(DeviceSet::parse("ASIC"), DeviceSet::parse("fpga"));
    }
}
