//! Tiles and the creatures standing on them.

use serde::{Deserialize, Serialize};
use std::mem::size_of;

use crate::item::Item;

bitflags::bitflags! {
    /// Zone and behaviour flags stored per tile.
    ///
    /// Bits this build does not name are retained so they survive a
    /// load/save cycle.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TileFlags: u32 {
        /// No combat, no damage.
        const PROTECTION_ZONE = 0x0000_0001;
        /// Player-versus-player combat disabled.
        const NO_PVP = 0x0000_0004;
        /// Players cannot log out here.
        const NO_LOGOUT = 0x0000_0008;
        /// Combat without skull penalties.
        const PVP_ZONE = 0x0000_0010;
        /// Tile items are refreshed periodically.
        const REFRESH = 0x0000_0020;
    }
}

impl Default for TileFlags {
    fn default() -> Self {
        TileFlags::empty()
    }
}

/// Facing of a placed creature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// Facing up.
    North = 0,
    /// Facing right.
    East = 1,
    /// Facing down (default for placed creatures).
    #[default]
    South = 2,
    /// Facing left.
    West = 3,
}

impl Direction {
    /// Stable numeric representation.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse the numeric representation.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::North),
            1 => Some(Self::East),
            2 => Some(Self::South),
            3 => Some(Self::West),
            _ => None,
        }
    }
}

/// A creature placed on a tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Creature {
    /// Creature type name.
    pub name: String,
    /// Respawn time in seconds.
    pub spawn_time: u32,
    /// Initial facing.
    pub direction: Direction,
}

impl Creature {
    /// Creature with the default 60 second respawn, facing south.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spawn_time: 60,
            direction: Direction::South,
        }
    }
}

/// Contents of one map position.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tile {
    /// Ground item, drawn below everything else.
    ///
    /// Only a plain ground (no attributes, no contents) is stored inline on
    /// disk. Any other ground is written as the first stacked item, so after a
    /// save and reload it comes back as `items[0]` and this field is `None`.
    pub ground: Option<Item>,
    /// Stacked items, bottom to top.
    pub items: Vec<Item>,
    /// Creature standing here.
    pub creature: Option<Creature>,
    /// House this tile belongs to.
    pub house_id: Option<u32>,
    /// Zone flags.
    pub flags: TileFlags,
    /// Trailing tile attribute bytes this build does not understand.
    pub reserved: Vec<u8>,
}

impl Tile {
    /// Tile with just a ground item.
    pub fn with_ground(id: u16) -> Self {
        Self {
            ground: Some(Item::new(id)),
            ..Self::default()
        }
    }

    /// Push an item on top of the stack (builder style).
    pub fn stacked(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    /// A tile with nothing on it carries no information and is never stored.
    pub fn is_empty(&self) -> bool {
        self.ground.is_none()
            && self.items.is_empty()
            && self.creature.is_none()
            && self.house_id.is_none()
            && self.flags.is_empty()
            && self.reserved.is_empty()
    }

    /// Ground plus stacked item count (containers count once).
    pub fn item_count(&self) -> usize {
        usize::from(self.ground.is_some()) + self.items.len()
    }

    /// Iterate ground then stacked items, bottom to top.
    pub fn all_items(&self) -> impl Iterator<Item = &Item> + '_ {
        self.ground.iter().chain(self.items.iter())
    }

    /// Whether the tile belongs to a house.
    pub fn is_house_tile(&self) -> bool {
        self.house_id.is_some()
    }

    /// Approximate footprint in bytes, used for undo memory accounting.
    pub fn memsize(&self) -> usize {
        size_of::<Tile>()
            + self.all_items().map(Item::memsize).sum::<usize>()
            + self
                .creature
                .as_ref()
                .map_or(0, |creature| creature.name.capacity())
            + self.reserved.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tile_is_empty() {
        assert!(Tile::default().is_empty());
    }

    #[test]
    fn any_content_makes_tile_non_empty() {
        assert!(!Tile::with_ground(1).is_empty());

        let zoned = Tile {
            flags: TileFlags::PROTECTION_ZONE,
            ..Tile::default()
        };
        assert!(!zoned.is_empty());

        let housed = Tile {
            house_id: Some(4),
            ..Tile::default()
        };
        assert!(!housed.is_empty());

        let occupied = Tile {
            creature: Some(Creature::new("rat")),
            ..Tile::default()
        };
        assert!(!occupied.is_empty());
    }

    #[test]
    fn all_items_is_ground_first() {
        let tile = Tile::with_ground(1).stacked(Item::new(2)).stacked(Item::new(3));
        let ids: Vec<_> = tile.all_items().map(|item| item.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(tile.item_count(), 3);
    }

    #[test]
    fn unknown_flag_bits_are_retained() {
        let flags = TileFlags::from_bits_retain(0x0000_0101);
        assert!(flags.contains(TileFlags::PROTECTION_ZONE));
        assert_eq!(flags.bits(), 0x0000_0101);
    }

    #[test]
    fn direction_roundtrip() {
        for value in 0..4 {
            let direction = Direction::from_u8(value).unwrap();
            assert_eq!(direction.as_u8(), value);
        }
        assert_eq!(Direction::from_u8(9), None);
    }
}
