//! Transient set of selected positions. Never persisted.

use std::collections::BTreeSet;

use mapforge_core::{Area, Position};

use crate::history::{Action, ActionKind};
use crate::TileStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    positions: BTreeSet<Position>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the position was already selected.
    pub fn add(&mut self, pos: Position) -> bool {
        self.positions.insert(pos)
    }

    pub fn remove(&mut self, pos: Position) -> bool {
        self.positions.remove(&pos)
    }

    /// Flip membership; returns whether the position is now selected.
    pub fn toggle(&mut self, pos: Position) -> bool {
        if self.positions.remove(&pos) {
            false
        } else {
            self.positions.insert(pos);
            true
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.positions.contains(&pos)
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Selected positions in storage order.
    pub fn iter(&self) -> impl Iterator<Item = Position> + '_ {
        self.positions.iter().copied()
    }

    /// Select every stored tile inside `area`. Returns how many were added.
    pub fn add_area(&mut self, store: &TileStore, area: Area) -> usize {
        let before = self.positions.len();
        self.positions.extend(store.tiles_in(area).map(|(pos, _)| pos));
        self.positions.len() - before
    }

    /// Smallest area covering the selection.
    pub fn bounds(&self) -> Option<Area> {
        let first = *self.positions.first()?;
        let (mut min, mut max) = (first, first);
        for pos in self.iter() {
            min = Position::new(min.x.min(pos.x), min.y.min(pos.y), min.z.min(pos.z));
            max = Position::new(max.x.max(pos.x), max.y.max(pos.y), max.z.max(pos.z));
        }
        Some(Area { min, max })
    }

    /// Drop positions whose tile no longer exists, e.g. after an undo.
    pub fn retain_existing(&mut self, store: &TileStore) {
        self.positions.retain(|pos| store.get(*pos).is_some());
    }

    /// Action erasing every selected tile.
    pub fn to_erase_action(&self) -> Action {
        self.iter()
            .fold(Action::new(ActionKind::DeleteTiles), |action, pos| action.erase(pos))
    }
}

impl FromIterator<Position> for Selection {
    fn from_iter<I: IntoIterator<Item = Position>>(iter: I) -> Self {
        Self {
            positions: iter.into_iter().collect(),
        }
    }
}
