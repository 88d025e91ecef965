//! Descriptor loader: parses an XML-like source document into a
//! [`Descriptor`], normalizing every item identifier on the way in.
//!
//! Expected shape:
//!
//! ```xml
//! <HISTUDIO>
//!   <GROUP NAME="Factory" ID="0x1">
//!     <NV ID="0x01" PARAM_NAME="..." PARAM_VALUE="..." DEV="ASIC-FPGA"/>
//!   </GROUP>
//! </HISTUDIO>
//! ```
//!
//! `GROUP` elements directly under the root and `NV` elements directly under
//! a group are significant; anything else is skipped.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use nvb_types::{Descriptor, DeviceSet, Group, GroupId, Item, ItemId};

use crate::error::{DescriptorError, DescriptorResult};

pub(crate) const GROUP_TAG: &str = "GROUP";
pub(crate) const ITEM_TAG: &str = "NV";
pub(crate) const ATTR_NAME: &str = "NAME";
pub(crate) const ATTR_ID: &str = "ID";
pub(crate) const ATTR_VALUE: &str = "PARAM_VALUE";
pub(crate) const ATTR_DEV: &str = "DEV";

/// Read and parse a descriptor file.
pub fn load_file(path: &Path) -> DescriptorResult<Descriptor> {
    let text = std::fs::read_to_string(path).map_err(|e| DescriptorError::io(path, e))?;
    parse_str(&text, &path.display().to_string())
}

/// Parse descriptor text. `source_name` is used in error messages only.
pub fn parse_str(text: &str, source_name: &str) -> DescriptorResult<Descriptor> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut root: Option<String> = None;
    let mut groups: Vec<Group> = Vec::new();
    let mut current: Option<Group> = None;
    let mut depth = 0usize;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(DescriptorError::parse(
                    source_name,
                    format!("at byte {}: {e}", reader.buffer_position()),
                ))
            }
        };

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let name = element_name(e);
                match depth {
                    0 => {
                        if root.is_some() {
                            return Err(DescriptorError::parse(
                                source_name,
                                format!("unexpected second root element <{name}>"),
                            ));
                        }
                        root = Some(name);
                    }
                    1 if name == GROUP_TAG => {
                        let group = parse_group(e, source_name)?;
                        if is_empty {
                            groups.push(group);
                        } else {
                            current = Some(group);
                        }
                    }
                    2 if name == ITEM_TAG => {
                        if let Some(group) = current.as_mut() {
                            group.items.push(parse_item(e, source_name)?);
                        }
                    }
                    _ => debug!(source = source_name, element = %name, depth, "skipping element"),
                }
                if !is_empty {
                    depth += 1;
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 1 {
                    if let Some(group) = current.take() {
                        groups.push(group);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth != 0 {
        return Err(DescriptorError::parse(source_name, "unexpected end of document"));
    }
    let root = root.ok_or_else(|| DescriptorError::parse(source_name, "no root element"))?;

    debug!(
        source = source_name,
        groups = groups.len(),
        items = groups.iter().map(|g| g.items.len()).sum::<usize>(),
        "loaded descriptor"
    );
    Ok(Descriptor { root, groups })
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn read_attributes(e: &BytesStart<'_>, source_name: &str) -> DescriptorResult<Vec<(String, String)>> {
    e.attributes()
        .map(|attr| {
            let attr = attr.map_err(|err| DescriptorError::parse(source_name, err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| DescriptorError::parse(source_name, err.to_string()))?
                .into_owned();
            Ok((key, value))
        })
        .collect()
}

/// Remove and return the first attribute named `key`.
fn take_attribute(attrs: &mut Vec<(String, String)>, key: &str) -> Option<String> {
    let pos = attrs.iter().position(|(k, _)| k == key)?;
    Some(attrs.remove(pos).1)
}

fn parse_group(e: &BytesStart<'_>, source_name: &str) -> DescriptorResult<Group> {
    let mut attributes = read_attributes(e, source_name)?;
    let name = take_attribute(&mut attributes, ATTR_NAME)
        .ok_or_else(|| DescriptorError::parse(source_name, "group without NAME"))?;
    let raw_id = take_attribute(&mut attributes, ATTR_ID).ok_or_else(|| {
        DescriptorError::parse(source_name, format!("group {name:?} without ID"))
    })?;
    let id = GroupId::parse(&raw_id).map_err(|err| {
        DescriptorError::parse(source_name, format!("group {name:?}: {err}"))
    })?;
    Ok(Group {
        name,
        id,
        items: Vec::new(),
        attributes,
    })
}

fn parse_item(e: &BytesStart<'_>, source_name: &str) -> DescriptorResult<Item> {
    let mut attributes = read_attributes(e, source_name)?;
    let raw_id = take_attribute(&mut attributes, ATTR_ID)
        .ok_or_else(|| DescriptorError::parse(source_name, "item without ID"))?;
    let id = ItemId::parse(&raw_id)
        .map_err(|err| DescriptorError::parse(source_name, format!("item: {err}")))?;
    let value = take_attribute(&mut attributes, ATTR_VALUE);
    let devices = take_attribute(&mut attributes, ATTR_DEV)
        .map(|dev| DeviceSet::parse(&dev))
        .unwrap_or_default();
    Ok(Item {
        id,
        value,
        devices,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<HISTUDIO>
  <GROUP NAME="Keep" ID="0x2" FEATURE="x">
    <NV ID="128" PARAM_NAME="wifi_cfg" PARAM_VALUE="{1, 2}" DEV="ASIC-FPGA"/>
    <NV ID="0X81" PARAM_NAME="other" PARAM_VALUE="3"/>
  </GROUP>
  <GROUP NAME="Factory" ID="1">
    <NV ID="0x01" PARAM_VALUE="&quot;sn&quot;" DEV=""/>
  </GROUP>
  <GROUP NAME="Empty" ID="3"/>
</HISTUDIO>
"#;

    #[test]
    fn parses_groups_and_items_in_source_order() {
        let d = parse_str(SAMPLE, "sample").unwrap();
        assert_eq!(d.root, "HISTUDIO");
        let names: Vec<&str> = d.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Keep", "Factory", "Empty"]);
        assert_eq!(d.groups[0].id, GroupId::new(2));
        assert_eq!(d.groups[1].id, GroupId::new(1));
        assert!(d.groups[2].items.is_empty());
    }

    #[test]
    fn normalizes_identifiers() {
        let d = parse_str(SAMPLE, "sample").unwrap();
        let ids: Vec<u32> = d.item_ids().map(ItemId::get).collect();
        assert_eq!(ids, vec![0x80, 0x81, 0x01]);
    }

    #[test]
    fn splits_typed_and_opaque_attributes() {
        let d = parse_str(SAMPLE, "sample").unwrap();
        let item = d.item(ItemId::new(0x80)).unwrap();
        assert_eq!(item.value.as_deref(), Some("{1, 2}"));
        assert!(item.devices.contains("asic"));
        assert!(item.devices.contains("fpga"));
        assert_eq!(item.attributes, vec![("PARAM_NAME".to_string(), "wifi_cfg".to_string())]);
        assert_eq!(
            d.groups[0].attributes,
            vec![("FEATURE".to_string(), "x".to_string())]
        );
    }

    #[test]
    fn unescapes_values_and_blank_dev_means_all() {
        let d = parse_str(SAMPLE, "sample").unwrap();
        let item = d.item(ItemId::new(0x01)).unwrap();
        assert_eq!(item.value.as_deref(), Some("\"sn\""));
        assert!(item.devices.is_empty());
    }

    #[test]
    fn skips_unknown_elements() {
        let text = r#"<ROOT><META/><GROUP NAME="A" ID="1"><NOTE>hi</NOTE><NV ID="5"/></GROUP></ROOT>"#;
        let d = parse_str(text, "t").unwrap();
        assert_eq!(d.root, "ROOT");
        assert_eq!(d.groups.len(), 1);
        assert_eq!(d.item_count(), 1);
    }

    #[test]
    fn item_without_id_is_a_parse_error() {
        let text = r#"<R><GROUP NAME="A" ID="1"><NV PARAM_VALUE="1"/></GROUP></R>"#;
        let err = parse_str(text, "t").unwrap_err();
        assert!(matches!(err, DescriptorError::Parse { .. }));
        assert!(err.to_string().contains("item without ID"));
    }

    #[test]
    fn bad_item_id_is_a_parse_error() {
        let text = r#"<R><GROUP NAME="A" ID="1"><NV ID="zz"/></GROUP></R>"#;
        assert!(matches!(
            parse_str(text, "t"),
            Err(DescriptorError::Parse { .. })
        ));
    }

    #[test]
    fn group_without_name_or_id_is_a_parse_error() {
        assert!(parse_str(r#"<R><GROUP ID="1"/></R>"#, "t").is_err());
        assert!(parse_str(r#"<R><GROUP NAME="A"/></R>"#, "t").is_err());
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            parse_str("<R><GROUP NAME=\"A\" ID=\"1\"></R>", "t"),
            Err(DescriptorError::Parse { .. })
        ));
        assert!(matches!(parse_str("", "t"), Err(DescriptorError::Parse { .. })));
        assert!(matches!(
            parse_str("<R/><S/>", "t"),
            Err(DescriptorError::Parse { .. })
        ));
    }

    #[test]
    fn error_names_the_source() {
        let err = parse_str("<R><GROUP/></R>", "mss_nvi_db.xml").unwrap_err();
        assert!(err.to_string().contains("mss_nvi_db.xml"));
    }

    #[test]
    fn load_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.xml");
        std::fs::write(&path, SAMPLE).unwrap();
        let d = load_file(&path).unwrap();
        assert_eq!(d.item_count(), 3);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_file(Path::new("/nonexistent/db.xml")).unwrap_err();
        assert!(matches!(err, DescriptorError::Io { .. }));
    }
}
