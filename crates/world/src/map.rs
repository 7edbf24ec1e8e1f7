//! The map aggregate: decoded data plus the editing session around it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use bitflags::bitflags;
use mapforge_core::{House, Position, Spawn, Town, Waypoint};
use serde::Serialize;

use crate::history::{Action, ActionHistory, ActionKind, EditTarget, HistoryConfig};
use crate::otbm::{Decoded, IDENTIFIER};
use crate::selection::Selection;
use crate::{ChangeFeed, HistoryError, MapEvent, TileStore, Warning};

bitflags! {
    /// Optional top-level sections present in the file, kept so that an
    /// empty section survives a round trip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SectionFlags: u8 {
        const TOWNS = 0x01;
        const WAYPOINTS = 0x02;
        const SPAWNS = 0x04;
        const HOUSES = 0x08;
    }
}

/// Root and MAP_DATA fields of a map file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapHeader {
    /// `OTBM` or four zero bytes; written back as read.
    pub identifier: [u8; 4],
    pub version: u32,
    pub width: u16,
    pub height: u16,
    pub items_major: u32,
    pub items_minor: u32,
    pub descriptions: Vec<String>,
    /// Companion spawn file, relative to the map's directory.
    pub spawn_file: Option<String>,
    /// Companion house file, relative to the map's directory.
    pub house_file: Option<String>,
    pub sections: SectionFlags,
    /// Trailing root payload bytes.
    pub root_reserved: Vec<u8>,
    /// MAP_DATA attributes from the first unknown one on.
    pub data_reserved: Vec<u8>,
}

impl Default for MapHeader {
    fn default() -> Self {
        Self {
            identifier: IDENTIFIER,
            version: 0,
            width: 0,
            height: 0,
            items_major: 0,
            items_minor: 0,
            descriptions: Vec::new(),
            spawn_file: None,
            house_file: None,
            sections: SectionFlags::empty(),
            root_reserved: Vec::new(),
            data_reserved: Vec::new(),
        }
    }
}

impl MapHeader {
    pub const MIN_SIZE: u16 = 64;
    pub const MAX_SIZE: u16 = 65000;

    /// Header for a freshly created map.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            version: 2,
            width: width.clamp(Self::MIN_SIZE, Self::MAX_SIZE),
            height: height.clamp(Self::MIN_SIZE, Self::MAX_SIZE),
            items_major: 3,
            items_minor: 57,
            descriptions: vec!["No map description available.".to_owned()],
            sections: SectionFlags::TOWNS | SectionFlags::WAYPOINTS,
            ..Self::default()
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height && pos.is_valid()
    }
}

/// Everything a map file holds. Cloning is cheap: chunks are shared until
/// one side writes to them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapData {
    pub header: MapHeader,
    pub store: TileStore,
    pub spawns: BTreeMap<Position, Spawn>,
    pub houses: BTreeMap<u32, House>,
    pub towns: Vec<Town>,
    pub waypoints: Vec<Waypoint>,
}

impl MapData {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            header: MapHeader::new(width, height),
            ..Self::default()
        }
    }

    pub fn stats(&self) -> MapStats {
        let mut stats = MapStats {
            tiles: self.store.len(),
            chunks: self.store.chunk_count(),
            spawns: self.spawns.len(),
            houses: self.houses.len(),
            towns: self.towns.len(),
            waypoints: self.waypoints.len(),
            ..MapStats::default()
        };
        for (_, tile) in self.store.iter() {
            stats.items += tile.all_items().map(|item| item.total_count()).sum::<usize>();
            stats.creatures += usize::from(tile.creature.is_some());
            stats.house_tiles += usize::from(tile.is_house_tile());
        }
        stats
    }
}

/// Counts reported by `MapData::stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapStats {
    pub tiles: usize,
    pub chunks: usize,
    /// Every item including container contents.
    pub items: usize,
    pub creatures: usize,
    pub house_tiles: usize,
    pub spawns: usize,
    pub houses: usize,
    pub towns: usize,
    pub waypoints: usize,
}

/// An open map: its data, undo history, selection and subscribers.
#[derive(Debug, Default)]
pub struct Map {
    data: MapData,
    history: ActionHistory,
    feed: ChangeFeed,
    selection: Selection,
    path: Option<PathBuf>,
    warnings: Vec<Warning>,
    changed: bool,
}

impl Map {
    /// Empty map of the given size.
    pub fn new(width: u16, height: u16) -> Self {
        Self::from_data(MapData::new(width, height))
    }

    pub fn from_data(data: MapData) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn with_history(mut self, config: HistoryConfig) -> Self {
        self.history = ActionHistory::new(config);
        self
    }

    pub fn data(&self) -> &MapData {
        &self.data
    }

    /// Direct access that bypasses the history. Later undo/redo of entries
    /// touching the same targets fails with `HistoryError::Inconsistent`.
    pub fn data_mut(&mut self) -> &mut MapData {
        self.changed = true;
        &mut self.data
    }

    pub fn store(&self) -> &TileStore {
        &self.data.store
    }

    /// Bulk population outside the history, for importers and generators.
    pub fn store_mut(&mut self) -> &mut TileStore {
        self.changed = true;
        &mut self.data.store
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    /// File this map was loaded from or last saved to.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Warnings from the last load.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Whether anything changed since the last load or save.
    pub fn has_changes(&self) -> bool {
        self.changed
    }

    /// Copy-on-write snapshot for readers on other threads.
    pub fn snapshot(&self) -> MapData {
        self.data.clone()
    }

    pub fn subscribe(&mut self) -> Receiver<MapEvent> {
        self.feed.subscribe()
    }

    pub fn apply(&mut self, action: Action) -> Result<(), HistoryError> {
        let mut target = edit_target(&mut self.data, &mut self.feed);
        self.history.apply(&mut target, action)?;
        self.changed = true;
        Ok(())
    }

    pub fn begin_batch(&mut self, kind: ActionKind) -> Result<(), HistoryError> {
        self.history.begin_batch(kind)
    }

    pub fn commit_batch(&mut self) -> Result<(), HistoryError> {
        self.history.commit_batch()
    }

    pub fn cancel_batch(&mut self) -> Result<(), HistoryError> {
        let mut target = edit_target(&mut self.data, &mut self.feed);
        self.history.cancel_batch(&mut target)
    }

    pub fn undo(&mut self) -> Result<bool, HistoryError> {
        let mut target = edit_target(&mut self.data, &mut self.feed);
        let undone = self.history.undo(&mut target)?;
        self.changed |= undone;
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<bool, HistoryError> {
        let mut target = edit_target(&mut self.data, &mut self.feed);
        let redone = self.history.redo(&mut target)?;
        self.changed |= redone;
        Ok(redone)
    }

    /// Erase every selected tile as one undoable action and clear the
    /// selection.
    pub fn delete_selection(&mut self) -> Result<(), HistoryError> {
        if self.selection.is_empty() {
            return Ok(());
        }
        self.apply(self.selection.to_erase_action())?;
        self.selection.clear();
        Ok(())
    }

    /// Swap in freshly decoded data. History and selection are reset and
    /// subscribers receive `MapReloaded`.
    pub fn replace_with(&mut self, decoded: Decoded, path: Option<PathBuf>) {
        self.data = decoded.map;
        self.warnings = decoded.warnings;
        self.path = path;
        self.history.clear();
        self.selection.clear();
        self.changed = false;
        self.feed.emit(MapEvent::MapReloaded);
    }

    /// Name companion spawn/house files after `stem` so they are written
    /// beside the map instead of inline.
    pub fn name_companions(&mut self, stem: &str) {
        let header = &mut self.data.header;
        header.spawn_file = Some(format!("{stem}-spawn.otbm"));
        header.house_file = Some(format!("{stem}-house.otbm"));
        self.changed = true;
    }

    pub(crate) fn mark_saved(&mut self, path: PathBuf) {
        self.path = Some(path);
        self.changed = false;
    }

    pub(crate) fn set_warnings(&mut self, warnings: Vec<Warning>) {
        self.warnings = warnings;
    }
}

/// Borrow the editable parts of `data` alongside the feed.
fn edit_target<'a>(data: &'a mut MapData, feed: &'a mut ChangeFeed) -> EditTarget<'a> {
    EditTarget {
        store: &mut data.store,
        houses: &mut data.houses,
        waypoints: &mut data.waypoints,
        feed,
    }
}
