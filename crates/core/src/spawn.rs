//! Creature spawn regions.

use serde::{Deserialize, Serialize};

use crate::Position;

/// One creature type a spawn may produce, with its relative weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpawnEntry {
    /// Creature type name.
    pub name: String,
    /// Relative selection weight.
    pub weight: u16,
}

/// Radius-bounded region around a center tile where creatures appear.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spawn {
    /// Center tile; must exist inside the map bounds.
    pub center: Position,
    /// Chebyshev radius in tiles.
    pub radius: u16,
    /// Creature types this spawn produces.
    pub entries: Vec<SpawnEntry>,
    /// Respawn interval in seconds.
    pub interval: u32,
}

impl Spawn {
    /// Spawn without entries and a 60 second interval.
    pub fn new(center: Position, radius: u16) -> Self {
        Self {
            center,
            radius,
            entries: Vec::new(),
            interval: 60,
        }
    }

    /// Add a creature entry (builder style).
    pub fn with_entry(mut self, name: impl Into<String>, weight: u16) -> Self {
        self.entries.push(SpawnEntry {
            name: name.into(),
            weight,
        });
        self
    }

    /// Whether `pos` is inside the spawn's square on the same floor.
    pub fn covers(&self, pos: Position) -> bool {
        pos.z == self.center.z
            && u32::from(pos.x.abs_diff(self.center.x)) <= u32::from(self.radius)
            && u32::from(pos.y.abs_diff(self.center.y)) <= u32::from(self.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_square_on_same_floor() {
        let spawn = Spawn::new(Position::new(100, 100, 7), 2).with_entry("rat", 1);
        assert!(spawn.covers(Position::new(98, 102, 7)));
        assert!(!spawn.covers(Position::new(97, 100, 7)));
        assert!(!spawn.covers(Position::new(100, 100, 6)));
    }

    #[test]
    fn zero_radius_covers_only_center() {
        let spawn = Spawn::new(Position::new(5, 5, 0), 0);
        assert!(spawn.covers(Position::new(5, 5, 0)));
        assert!(!spawn.covers(Position::new(5, 6, 0)));
    }
}
