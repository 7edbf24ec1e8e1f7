//! Items, their typed attributes and container contents.
//!
//! Attributes are kept as an ordered list so that a decoded item re-encodes
//! in exactly the order it was read. Attribute ids the codec does not know
//! are carried as [`AttributeValue::Opaque`] and always sit last.

use serde::{Deserialize, Serialize};
use std::mem::size_of;

use crate::Position;

/// Maximum container nesting accepted anywhere in the core.
pub const MAX_CONTAINER_DEPTH: usize = 64;

/// Item type identifier.
pub type ItemId = u16;

/// Well-known item attribute ids.
pub mod attr {
    /// Action id (u16).
    pub const ACTION_ID: u8 = 4;
    /// Unique id (u16).
    pub const UNIQUE_ID: u8 = 5;
    /// Readable text (string).
    pub const TEXT: u8 = 6;
    /// Custom description (string).
    pub const DESC: u8 = 7;
    /// Teleport destination (position).
    pub const TELE_DEST: u8 = 8;
    /// Depot id (u16).
    pub const DEPOT_ID: u8 = 10;
    /// Rune charges (u8).
    pub const RUNE_CHARGES: u8 = 12;
    /// House door id (u8).
    pub const HOUSE_DOOR_ID: u8 = 14;
    /// Stack count or fluid subtype (u8).
    pub const COUNT: u8 = 15;
    /// Remaining duration (u32).
    pub const DURATION: u8 = 16;
    /// Decay state (u8).
    pub const DECAYING_STATE: u8 = 17;
    /// Date text was written (u32).
    pub const WRITTEN_DATE: u8 = 18;
    /// Author of written text (string).
    pub const WRITTEN_BY: u8 = 19;
    /// Bed sleeper guid (u32).
    pub const SLEEPER_GUID: u8 = 20;
    /// Bed sleep start (u32).
    pub const SLEEP_START: u8 = 21;
    /// Charges (u16).
    pub const CHARGES: u8 = 22;
    /// Keyed property map.
    pub const ATTRIBUTE_MAP: u8 = 128;
}

/// Shape of a known attribute's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// One byte.
    U8,
    /// Two bytes, little endian.
    U16,
    /// Four bytes, little endian.
    U32,
    /// Length-prefixed Latin-1 string.
    Str,
    /// x, y, z.
    Position,
    /// Keyed property map.
    Map,
}

/// Payload kind of a known attribute id, `None` for ids this build does not
/// understand.
pub fn attribute_kind(id: u8) -> Option<AttributeKind> {
    use attr::*;
    Some(match id {
        ACTION_ID | UNIQUE_ID | DEPOT_ID | CHARGES => AttributeKind::U16,
        TEXT | DESC | WRITTEN_BY => AttributeKind::Str,
        TELE_DEST => AttributeKind::Position,
        RUNE_CHARGES | HOUSE_DOOR_ID | COUNT | DECAYING_STATE => AttributeKind::U8,
        DURATION | WRITTEN_DATE | SLEEPER_GUID | SLEEP_START => AttributeKind::U32,
        ATTRIBUTE_MAP => AttributeKind::Map,
        _ => return None,
    })
}

/// Value stored in an attribute map entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Property {
    /// Long string.
    String(String),
    /// Signed 32-bit integer.
    Integer(i32),
    /// Single precision float.
    Float(f32),
    /// Boolean.
    Boolean(bool),
    /// Double precision float.
    Double(f64),
}

impl Property {
    /// Wire tag of the value type.
    pub fn tag(&self) -> u8 {
        match self {
            Property::String(_) => 1,
            Property::Integer(_) => 2,
            Property::Float(_) => 3,
            Property::Boolean(_) => 4,
            Property::Double(_) => 5,
        }
    }
}

/// Typed attribute payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// One byte.
    U8(u8),
    /// Two bytes.
    U16(u16),
    /// Four bytes.
    U32(u32),
    /// Text.
    Str(String),
    /// Map position.
    Position(Position),
    /// Ordered key/value properties.
    Map(Vec<(String, Property)>),
    /// Raw bytes of an attribute this build cannot interpret; runs to the end
    /// of the item payload.
    Opaque(Vec<u8>),
}

/// One attribute of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute id as written on disk.
    pub id: u8,
    /// Payload.
    pub value: AttributeValue,
}

impl Attribute {
    /// Build an attribute.
    pub fn new(id: u8, value: AttributeValue) -> Self {
        Self { id, value }
    }

    fn heap_size(&self) -> usize {
        match &self.value {
            AttributeValue::Str(s) => s.capacity(),
            AttributeValue::Opaque(bytes) => bytes.capacity(),
            AttributeValue::Map(entries) => entries
                .iter()
                .map(|(key, value)| {
                    size_of::<(String, Property)>()
                        + key.capacity()
                        + match value {
                            Property::String(s) => s.capacity(),
                            _ => 0,
                        }
                })
                .sum(),
            _ => 0,
        }
    }
}

/// A placed item, possibly a container holding other items.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Item {
    /// Item type id (editor numbering, after version remapping).
    pub id: ItemId,
    /// Attributes in on-disk order.
    pub attributes: Vec<Attribute>,
    /// Container contents, first to last.
    pub contents: Vec<Item>,
}

impl Item {
    /// Plain item without attributes.
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            attributes: Vec::new(),
            contents: Vec::new(),
        }
    }

    /// Item carrying a stack count.
    pub fn with_count(id: ItemId, count: u8) -> Self {
        let mut item = Self::new(id);
        item.set_count(count);
        item
    }

    /// Add a child item (builder style).
    pub fn containing(mut self, child: Item) -> Self {
        self.contents.push(child);
        self
    }

    /// True when the item has neither attributes nor contents.
    pub fn is_plain(&self) -> bool {
        self.attributes.is_empty() && self.contents.is_empty()
    }

    /// Look up an attribute by id.
    pub fn attribute(&self, id: u8) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|attribute| attribute.id == id)
            .map(|attribute| &attribute.value)
    }

    /// Set an attribute, replacing an existing one in place or appending it
    /// ahead of any opaque tail.
    pub fn set_attribute(&mut self, id: u8, value: AttributeValue) {
        if let Some(existing) = self.attributes.iter_mut().find(|a| a.id == id) {
            existing.value = value;
            return;
        }
        let insert_at = self
            .attributes
            .iter()
            .position(|a| matches!(a.value, AttributeValue::Opaque(_)))
            .unwrap_or(self.attributes.len());
        self.attributes.insert(insert_at, Attribute::new(id, value));
    }

    /// Remove an attribute, returning its value.
    pub fn remove_attribute(&mut self, id: u8) -> Option<AttributeValue> {
        let index = self.attributes.iter().position(|a| a.id == id)?;
        Some(self.attributes.remove(index).value)
    }

    /// Count, charges or fluid subtype, whichever the item carries.
    pub fn subtype(&self) -> Option<u16> {
        self.attributes.iter().find_map(|a| match (a.id, &a.value) {
            (attr::COUNT, AttributeValue::U8(v)) | (attr::RUNE_CHARGES, AttributeValue::U8(v)) => {
                Some(u16::from(*v))
            }
            (attr::CHARGES, AttributeValue::U16(v)) => Some(*v),
            _ => None,
        })
    }

    /// Set the stack count.
    pub fn set_count(&mut self, count: u8) {
        self.set_attribute(attr::COUNT, AttributeValue::U8(count));
    }

    /// Action id, if set.
    pub fn action_id(&self) -> Option<u16> {
        match self.attribute(attr::ACTION_ID) {
            Some(AttributeValue::U16(v)) => Some(*v),
            _ => None,
        }
    }

    /// Unique id, if set.
    pub fn unique_id(&self) -> Option<u16> {
        match self.attribute(attr::UNIQUE_ID) {
            Some(AttributeValue::U16(v)) => Some(*v),
            _ => None,
        }
    }

    /// Readable text, if set.
    pub fn text(&self) -> Option<&str> {
        match self.attribute(attr::TEXT) {
            Some(AttributeValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Teleport destination, if set.
    pub fn teleport_destination(&self) -> Option<Position> {
        match self.attribute(attr::TELE_DEST) {
            Some(AttributeValue::Position(p)) => Some(*p),
            _ => None,
        }
    }

    /// Nesting depth: 1 for an item without contents.
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(&Item, usize)> = vec![(self, 1)];
        while let Some((item, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(item.contents.iter().map(|child| (child, depth + 1)));
        }
        deepest
    }

    /// Number of items including this one and everything it contains.
    pub fn total_count(&self) -> usize {
        1 + self.contents.iter().map(Item::total_count).sum::<usize>()
    }

    /// Approximate heap + inline footprint in bytes.
    pub fn memsize(&self) -> usize {
        size_of::<Item>()
            + self
                .attributes
                .iter()
                .map(|a| size_of::<Attribute>() + a.heap_size())
                .sum::<usize>()
            + self.contents.iter().map(Item::memsize).sum::<usize>()
    }

    /// Apply `f` to this item's id and to every contained item's id.
    pub fn remap_ids(&mut self, f: &impl Fn(ItemId) -> ItemId) {
        let mut stack: Vec<&mut Item> = vec![self];
        while let Some(item) = stack.pop() {
            item.id = f(item.id);
            stack.extend(item.contents.iter_mut());
        }
    }
}
