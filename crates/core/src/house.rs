//! Houses, towns and waypoints: named places referenced by tiles.

use serde::{Deserialize, Serialize};

use crate::Position;

/// A named, tile-bounded ownership region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct House {
    /// House id referenced by tiles.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Town the house belongs to.
    pub town_id: u32,
    /// Rent per period.
    pub rent: u32,
    /// Whether this is a guildhall.
    pub guildhall: bool,
    /// Entrance tile.
    pub exit: Option<Position>,
}

impl House {
    /// House without town, rent or exit.
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            town_id: 0,
            rent: 0,
            guildhall: false,
            exit: None,
        }
    }
}

/// A town and its temple position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Town {
    /// Town id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Where players respawn.
    pub temple: Position,
}

/// A named navigation point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Waypoint {
    /// Unique name.
    pub name: String,
    /// Marked position.
    pub position: Position,
}
