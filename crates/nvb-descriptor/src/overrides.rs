//! Deployment overrides: ordered `id → value` replacements read from a
//! `.cfg` file and applied to a product-scoped descriptor.
//!
//! File format, one `key = value` pair per line:
//!
//! ```text
//! # serial number
//! ID = 0x01
//! PARAM_VALUE = "ABC123"
//! ```
//!
//! `ID` selects the item that following `PARAM_VALUE` lines rewrite. Lines
//! that do not split into exactly two parts on `=`, comment lines, and
//! unknown keys are ignored.

use std::path::Path;

use tracing::debug;

use nvb_types::{Descriptor, ItemId};

use crate::error::{DescriptorError, DescriptorResult};

const KEY_ID: &str = "ID";
const KEY_VALUE: &str = "PARAM_VALUE";

/// A single value replacement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Override {
    pub id: ItemId,
    pub value: String,
}

/// The ordered replacements of one deployment variant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OverrideSet {
    entries: Vec<Override>,
}

impl OverrideSet {
    pub fn new(entries: Vec<Override>) -> Self {
        Self { entries }
    }

    /// Read and parse an override file.
    pub fn load(path: &Path) -> DescriptorResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| DescriptorError::io(path, e))?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Parse override text. `source_name` is used in error messages only.
    pub fn parse(text: &str, source_name: &str) -> DescriptorResult<Self> {
        let mut entries = Vec::new();
        let mut current: Option<ItemId> = None;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split('=').collect();
            let [key, value] = parts.as_slice() else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim());
            match key {
                KEY_ID => {
                    let id = ItemId::parse(value).map_err(|err| {
                        DescriptorError::parse(source_name, format!("line {}: {err}", lineno + 1))
                    })?;
                    current = Some(id);
                }
                KEY_VALUE => match current {
                    Some(id) => entries.push(Override {
                        id,
                        value: value.to_string(),
                    }),
                    None => debug!(source = source_name, line = lineno + 1, "value before any ID ignored"),
                },
                _ => {}
            }
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Override> {
        self.entries.iter()
    }

    /// Produce a new descriptor with every matching item's value replaced.
    ///
    /// Entries naming an id absent from `descriptor` have no effect. The
    /// input is left untouched, so one product descriptor can serve any
    /// number of variants.
    pub fn apply(&self, descriptor: &Descriptor) -> Descriptor {
        let mut result = descriptor.clone();
        for entry in &self.entries {
            let mut matched = false;
            for item in result
                .groups
                .iter_mut()
                .flat_map(|g| g.items.iter_mut())
                .filter(|item| item.id == entry.id)
            {
                item.value = Some(entry.value.clone());
                matched = true;
            }
            if !matched {
                debug!(id = %entry.id, "override for unknown item ignored");
            }
        }
        result
    }
}
