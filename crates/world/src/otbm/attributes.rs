//! Item attribute encode/decode, one arm per attribute kind.
//!
//! An attribute id this build does not know has no length on disk, so the
//! rest of the payload from that id on becomes one opaque attribute and is
//! written back untouched.

use mapforge_core::{attribute_kind, Attribute, AttributeKind, AttributeValue, Property};

use super::node::NodeWriter;
use super::props::{PayloadResult, PropReader};
use crate::MapError;

/// Read attributes until the payload is exhausted.
pub fn read_attributes(reader: &mut PropReader<'_>) -> PayloadResult<Vec<Attribute>> {
    let mut attributes = Vec::new();
    while !reader.is_exhausted() {
        let id = reader.u8("attribute id")?;
        let after_id = reader.position();
        let value = match attribute_kind(id) {
            Some(kind) => read_value(reader, kind)?,
            None => None,
        };
        match value {
            Some(value) => attributes.push(Attribute::new(id, value)),
            None => {
                reader.seek(after_id);
                attributes.push(Attribute::new(id, AttributeValue::Opaque(reader.rest())));
            }
        }
    }
    Ok(attributes)
}

/// `Ok(None)` when the value cannot be interpreted and must stay opaque.
fn read_value(
    reader: &mut PropReader<'_>,
    kind: AttributeKind,
) -> PayloadResult<Option<AttributeValue>> {
    Ok(Some(match kind {
        AttributeKind::U8 => AttributeValue::U8(reader.u8("attribute value")?),
        AttributeKind::U16 => AttributeValue::U16(reader.u16("attribute value")?),
        AttributeKind::U32 => AttributeValue::U32(reader.u32("attribute value")?),
        AttributeKind::Str => AttributeValue::Str(reader.string("attribute text")?),
        AttributeKind::Position => {
            AttributeValue::Position(reader.position_value("attribute position")?)
        }
        AttributeKind::Map => match read_map(reader)? {
            Some(entries) => AttributeValue::Map(entries),
            None => return Ok(None),
        },
    }))
}

fn read_map(reader: &mut PropReader<'_>) -> PayloadResult<Option<Vec<(String, Property)>>> {
    let count = reader.u16("attribute map size")?;
    let mut entries = Vec::with_capacity(usize::from(count).min(256));
    for _ in 0..count {
        let key = reader.string("attribute map key")?;
        let value = match reader.u8("attribute map type")? {
            1 => Property::String(reader.long_string("attribute map string")?),
            2 => Property::Integer(reader.i32("attribute map integer")?),
            3 => Property::Float(reader.f32("attribute map float")?),
            4 => Property::Boolean(reader.u8("attribute map bool")? != 0),
            5 => Property::Double(reader.f64("attribute map double")?),
            _ => return Ok(None),
        };
        entries.push((key, value));
    }
    Ok(Some(entries))
}

fn kind_matches(kind: AttributeKind, value: &AttributeValue) -> bool {
    matches!(
        (kind, value),
        (AttributeKind::U8, AttributeValue::U8(_))
            | (AttributeKind::U16, AttributeValue::U16(_))
            | (AttributeKind::U32, AttributeValue::U32(_))
            | (AttributeKind::Str, AttributeValue::Str(_))
            | (AttributeKind::Position, AttributeValue::Position(_))
            | (AttributeKind::Map, AttributeValue::Map(_))
    )
}

/// Write attributes in stored order.
pub fn write_attributes(writer: &mut NodeWriter, attributes: &[Attribute]) -> Result<(), MapError> {
    for (index, attribute) in attributes.iter().enumerate() {
        let id = attribute.id;
        if let AttributeValue::Opaque(bytes) = &attribute.value {
            if index + 1 != attributes.len() {
                return Err(MapError::Encode(format!(
                    "opaque attribute {id} must be the last attribute"
                )));
            }
            writer.u8(id);
            writer.bytes(bytes);
            continue;
        }

        match attribute_kind(id) {
            Some(kind) if kind_matches(kind, &attribute.value) => {}
            Some(kind) => {
                return Err(MapError::Encode(format!(
                    "attribute {id} expects a {kind:?} value"
                )))
            }
            None => {
                return Err(MapError::Encode(format!(
                    "attribute {id} is unknown and can only hold opaque bytes"
                )))
            }
        }

        writer.u8(id);
        match &attribute.value {
            AttributeValue::U8(v) => writer.u8(*v),
            AttributeValue::U16(v) => writer.u16(*v),
            AttributeValue::U32(v) => writer.u32(*v),
            AttributeValue::Str(text) => writer.string(text)?,
            AttributeValue::Position(pos) => writer.position_value(*pos),
            AttributeValue::Map(entries) => write_map(writer, entries)?,
            AttributeValue::Opaque(_) => unreachable!("handled above"),
        }
    }
    Ok(())
}

fn write_map(writer: &mut NodeWriter, entries: &[(String, Property)]) -> Result<(), MapError> {
    let count = u16::try_from(entries.len())
        .map_err(|_| MapError::Encode("attribute map has more than 65535 entries".into()))?;
    writer.u16(count);
    for (key, value) in entries {
        writer.string(key)?;
        writer.u8(value.tag());
        match value {
            Property::String(text) => writer.long_string(text)?,
            Property::Integer(v) => writer.bytes(&v.to_le_bytes()),
            Property::Float(v) => writer.bytes(&v.to_le_bytes()),
            Property::Boolean(v) => writer.u8(u8::from(*v)),
            Property::Double(v) => writer.bytes(&v.to_le_bytes()),
        }
    }
    Ok(())
}
