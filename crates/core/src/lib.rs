#![warn(missing_docs)]
//! Value types shared across the workspace: positions, items, tiles and the
//! named places a map carries alongside its tiles.

pub mod house;
pub mod item;
pub mod position;
pub mod spawn;
pub mod tile;

pub use house::{House, Town, Waypoint};
pub use item::{
    attr, attribute_kind, Attribute, AttributeKind, AttributeValue, Item, ItemId, Property,
    MAX_CONTAINER_DEPTH,
};
pub use position::{Area, Position, FLOOR_COUNT, GROUND_FLOOR, MAX_FLOOR};
pub use spawn::{Spawn, SpawnEntry};
pub use tile::{Creature, Direction, Tile, TileFlags};
