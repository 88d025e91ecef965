//! Serializes a [`Descriptor`] back to the source document shape.
//!
//! Identifiers are written in canonical form, which is what the item
//! compiler keys its output files on.

use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use nvb_types::{Descriptor, Group, Item};

use crate::error::{DescriptorError, DescriptorResult};
use crate::loader::{ATTR_DEV, ATTR_ID, ATTR_NAME, ATTR_VALUE, GROUP_TAG, ITEM_TAG};

/// Render a descriptor as an XML document.
pub fn to_xml_string(descriptor: &Descriptor) -> DescriptorResult<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
    write(&mut writer, Event::Start(BytesStart::new(descriptor.root.as_str())))?;
    for group in &descriptor.groups {
        write_group(&mut writer, group)?;
    }
    write(&mut writer, Event::End(BytesEnd::new(descriptor.root.as_str())))?;

    let mut text = String::from_utf8(writer.into_inner())
        .map_err(|e| DescriptorError::Write(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

/// Write a descriptor document to `path`.
pub fn write_file(path: &Path, descriptor: &Descriptor) -> DescriptorResult<()> {
    let text = to_xml_string(descriptor)?;
    std::fs::write(path, text).map_err(|e| DescriptorError::io(path, e))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> DescriptorResult<()> {
    writer
        .write_event(event)
        .map_err(|e| DescriptorError::Write(e.to_string()))
}

fn write_group(writer: &mut Writer<Vec<u8>>, group: &Group) -> DescriptorResult<()> {
    let id = group.id.to_string();
    let mut start = BytesStart::new(GROUP_TAG);
    start.push_attribute((ATTR_NAME, group.name.as_str()));
    start.push_attribute((ATTR_ID, id.as_str()));
    for (key, value) in &group.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if group.items.is_empty() {
        return write(writer, Event::Empty(start));
    }
    write(writer, Event::Start(start))?;
    for item in &group.items {
        write_item(writer, item)?;
    }
    write(writer, Event::End(BytesEnd::new(GROUP_TAG)))
}

fn write_item(writer: &mut Writer<Vec<u8>>, item: &Item) -> DescriptorResult<()> {
    let id = item.id.to_canonical();
    let mut element = BytesStart::new(ITEM_TAG);
    element.push_attribute((ATTR_ID, id.as_str()));
    for (key, value) in &item.attributes {
        element.push_attribute((key.as_str(), value.as_str()));
    }
    if let Some(value) = &item.value {
        element.push_attribute((ATTR_VALUE, value.as_str()));
    }
    if !item.devices.is_empty() {
        element.push_attribute((ATTR_DEV, item.devices.as_text()));
    }
    write(writer, Event::Empty(element))
}
