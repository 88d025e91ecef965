//! Merger: combines several loaded descriptors into one.
//!
//! Identifier uniqueness is checked across every input before anything is
//! combined. Two items sharing an identifier would alias the same storage
//! slot in the image, so a duplicate is always fatal and never resolved by
//! overwrite.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::debug;

use nvb_types::{Descriptor, ItemId, DEFAULT_ROOT};

use crate::error::{DescriptorError, DescriptorResult};

/// Merge descriptors, labelling them `source #1`, `source #2`, ... in errors.
pub fn merge(sources: &[Descriptor]) -> DescriptorResult<Descriptor> {
    let labels: Vec<String> = (1..=sources.len()).map(|i| format!("source #{i}")).collect();
    let labelled: Vec<(&str, &Descriptor)> = labels
        .iter()
        .map(String::as_str)
        .zip(sources.iter())
        .collect();
    merge_labelled(&labelled)
}

/// Merge descriptors in order. Each input carries a label (typically its
/// path) used to name both definitions when a duplicate id is found.
///
/// Groups are keyed by name: the first appearance is inserted whole and
/// later appearances append their items. The result is sorted by group id;
/// the sort is stable, so groups with equal ids keep first-appearance order.
pub fn merge_labelled(sources: &[(&str, &Descriptor)]) -> DescriptorResult<Descriptor> {
    check_unique(sources)?;

    let root = sources
        .first()
        .map(|(_, d)| d.root.clone())
        .unwrap_or_else(|| DEFAULT_ROOT.to_string());
    let mut merged = Descriptor {
        root,
        groups: Vec::new(),
    };
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for (label, descriptor) in sources {
        for group in &descriptor.groups {
            match positions.get(group.name.as_str()) {
                Some(&pos) => {
                    debug!(source = *label, group = %group.name, items = group.items.len(), "appending to existing group");
                    merged.groups[pos].items.extend(group.items.iter().cloned());
                }
                None => {
                    positions.insert(group.name.as_str(), merged.groups.len());
                    merged.groups.push(group.clone());
                }
            }
        }
    }

    merged.groups.sort_by_key(|g| g.id);
    debug!(
        sources = sources.len(),
        groups = merged.groups.len(),
        items = merged.item_count(),
        "merged descriptors"
    );
    Ok(merged)
}

fn check_unique(sources: &[(&str, &Descriptor)]) -> DescriptorResult<()> {
    let mut seen: HashMap<ItemId, &str> = HashMap::new();
    for (label, descriptor) in sources {
        for id in descriptor.item_ids() {
            match seen.entry(id) {
                Entry::Occupied(first) => {
                    return Err(DescriptorError::DuplicateId {
                        id,
                        first: first.get().to_string(),
                        second: label.to_string(),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(*label);
                }
            }
        }
    }
    Ok(())
}
