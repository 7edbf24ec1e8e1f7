//! Undo/redo over tile, house-exit and waypoint deltas.
//!
//! Every interactive mutation of a map flows through [`ActionHistory`]. An
//! applied [`Action`] is kept as a list of [`Change`]s holding the state
//! before and after the edit. Batches collect several actions into one undo
//! step; repeated edits to the same target inside an action or batch keep the
//! first before-state and the last after-state.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::mem::size_of;
use std::time::{Duration, Instant};

use mapforge_core::{House, Position, Tile, Waypoint, MAX_FLOOR};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ChangeFeed, HistoryError, MapEvent, StoreError, TileStore};

/// What kind of user operation produced an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Move,
    DeleteTiles,
    CutTiles,
    PasteTiles,
    Randomize,
    Borderize,
    Draw,
    SwitchDoor,
    RotateItem,
    ReplaceItems,
    ChangeProperties,
}

/// One requested edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Edit {
    /// Replace the tile at a position. An empty tile erases.
    SetTile(Position, Tile),
    /// Remove the tile at a position.
    Erase(Position),
    /// Move (or clear) a house exit.
    MoveHouseExit {
        house_id: u32,
        exit: Option<Position>,
    },
    /// Move a waypoint.
    MoveWaypoint { name: String, position: Position },
}

/// Ordered list of edits applied as one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    kind: ActionKind,
    edits: Vec<Edit>,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            edits: Vec::new(),
        }
    }

    pub fn set_tile(mut self, position: Position, tile: Tile) -> Self {
        self.edits.push(Edit::SetTile(position, tile));
        self
    }

    pub fn erase(mut self, position: Position) -> Self {
        self.edits.push(Edit::Erase(position));
        self
    }

    pub fn move_house_exit(mut self, house_id: u32, exit: Option<Position>) -> Self {
        self.edits.push(Edit::MoveHouseExit { house_id, exit });
        self
    }

    pub fn move_waypoint(mut self, name: impl Into<String>, position: Position) -> Self {
        self.edits.push(Edit::MoveWaypoint {
            name: name.into(),
            position,
        });
        self
    }

    pub fn push(&mut self, edit: Edit) {
        self.edits.push(edit);
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}

/// Identity of the thing a change touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKey {
    Tile(Position),
    HouseExit(u32),
    Waypoint(String),
}

impl fmt::Display for ChangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKey::Tile(position) => write!(f, "tile {position}"),
            ChangeKey::HouseExit(house_id) => write!(f, "exit of house {house_id}"),
            ChangeKey::Waypoint(name) => write!(f, "waypoint {name:?}"),
        }
    }
}

/// Recorded delta of one applied edit.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Tile {
        position: Position,
        before: Option<Tile>,
        after: Option<Tile>,
    },
    HouseExit {
        house_id: u32,
        before: Option<Position>,
        after: Option<Position>,
    },
    Waypoint {
        name: String,
        before: Position,
        after: Position,
    },
}

#[derive(Clone, Copy)]
enum Side {
    Before,
    After,
}

impl Change {
    pub fn key(&self) -> ChangeKey {
        match self {
            Change::Tile { position, .. } => ChangeKey::Tile(*position),
            Change::HouseExit { house_id, .. } => ChangeKey::HouseExit(*house_id),
            Change::Waypoint { name, .. } => ChangeKey::Waypoint(name.clone()),
        }
    }

    /// Approximate bytes held by the snapshots.
    pub fn memsize(&self) -> usize {
        size_of::<Change>()
            + match self {
                Change::Tile { before, after, .. } => {
                    before.as_ref().map_or(0, Tile::memsize) + after.as_ref().map_or(0, Tile::memsize)
                }
                Change::Waypoint { name, .. } => name.capacity(),
                Change::HouseExit { .. } => 0,
            }
    }

    fn event(&self) -> MapEvent {
        match self {
            Change::Tile { position, .. } => MapEvent::TileChanged(*position),
            Change::HouseExit { house_id, .. } => MapEvent::HouseExitMoved {
                house_id: *house_id,
            },
            Change::Waypoint { name, .. } => MapEvent::WaypointMoved { name: name.clone() },
        }
    }

    /// Keep this change's before-state and take `later`'s after-state.
    fn take_after(&mut self, later: Change) {
        match (self, later) {
            (Change::Tile { after, .. }, Change::Tile { after: newer, .. }) => *after = newer,
            (Change::HouseExit { after, .. }, Change::HouseExit { after: newer, .. }) => {
                *after = newer
            }
            (Change::Waypoint { after, .. }, Change::Waypoint { after: newer, .. }) => {
                *after = newer
            }
            _ => unreachable!("changes with equal keys have equal variants"),
        }
    }

    fn matches_live(&self, target: &EditTarget<'_>, side: Side) -> bool {
        match self {
            Change::Tile {
                position,
                before,
                after,
            } => {
                let expected = match side {
                    Side::Before => before,
                    Side::After => after,
                };
                target.store.get(*position) == expected.as_ref()
            }
            Change::HouseExit {
                house_id,
                before,
                after,
            } => {
                let expected = match side {
                    Side::Before => *before,
                    Side::After => *after,
                };
                target.houses.get(house_id).map(|house| house.exit) == Some(expected)
            }
            Change::Waypoint {
                name,
                before,
                after,
            } => {
                let expected = match side {
                    Side::Before => *before,
                    Side::After => *after,
                };
                find_waypoint(target.waypoints, name).map(|w| w.position) == Some(expected)
            }
        }
    }

    fn restore(&self, target: &mut EditTarget<'_>, side: Side) -> Result<(), HistoryError> {
        match self {
            Change::Tile {
                position,
                before,
                after,
            } => {
                let snapshot = match side {
                    Side::Before => before,
                    Side::After => after,
                };
                match snapshot {
                    Some(tile) => {
                        target.store.set(*position, tile.clone())?;
                    }
                    None => {
                        target.store.erase(*position);
                    }
                }
            }
            Change::HouseExit {
                house_id,
                before,
                after,
            } => {
                let house = target
                    .houses
                    .get_mut(house_id)
                    .ok_or(HistoryError::UnknownHouse(*house_id))?;
                house.exit = match side {
                    Side::Before => *before,
                    Side::After => *after,
                };
            }
            Change::Waypoint {
                name,
                before,
                after,
            } => {
                let waypoint = target
                    .waypoints
                    .iter_mut()
                    .find(|w| &w.name == name)
                    .ok_or_else(|| HistoryError::UnknownWaypoint(name.clone()))?;
                waypoint.position = match side {
                    Side::Before => *before,
                    Side::After => *after,
                };
            }
        }
        Ok(())
    }
}

fn find_waypoint<'w>(waypoints: &'w [Waypoint], name: &str) -> Option<&'w Waypoint> {
    waypoints.iter().find(|w| w.name == name)
}

/// The parts of a map the history mutates, borrowed for one operation.
pub struct EditTarget<'a> {
    pub store: &'a mut TileStore,
    pub houses: &'a mut BTreeMap<u32, House>,
    pub waypoints: &'a mut Vec<Waypoint>,
    pub feed: &'a mut ChangeFeed,
}

/// History limits, loaded from the `[history]` config section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Snapshot byte budget; 0 disables the limit.
    pub max_memory_bytes: usize,
    /// Maximum undo steps kept; 0 disables the limit.
    pub max_entries: usize,
    /// Merge consecutive entries of the same kind.
    pub group_actions: bool,
    /// Window for [`HistoryConfig::group_actions`], in milliseconds.
    pub stacking_delay_ms: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 64 * 1024 * 1024,
            max_entries: 40,
            group_actions: false,
            stacking_delay_ms: 0,
        }
    }
}

/// One undo step.
#[derive(Debug, Clone)]
struct Entry {
    kind: ActionKind,
    changes: Vec<Change>,
    index: HashMap<ChangeKey, usize>,
    actions: usize,
    memsize: usize,
    stamp: Instant,
}

impl Entry {
    fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            changes: Vec::new(),
            index: HashMap::new(),
            actions: 0,
            memsize: size_of::<Entry>(),
            stamp: Instant::now(),
        }
    }

    fn record(&mut self, change: Change) {
        let key = change.key();
        match self.index.get(&key) {
            Some(&at) => {
                let existing = &mut self.changes[at];
                self.memsize -= existing.memsize();
                existing.take_after(change);
                self.memsize += existing.memsize();
            }
            None => {
                self.memsize += change.memsize();
                self.index.insert(key, self.changes.len());
                self.changes.push(change);
            }
        }
    }

    fn absorb(&mut self, other: Entry) {
        for change in other.changes {
            self.record(change);
        }
        self.actions += other.actions;
        self.stamp = other.stamp;
    }
}

/// Bounded, batchable undo/redo stack.
#[derive(Debug, Default)]
pub struct ActionHistory {
    config: HistoryConfig,
    entries: VecDeque<Entry>,
    index: usize,
    batch: Option<Entry>,
    memory: usize,
    evicted: u64,
}

impl ActionHistory {
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// New limits apply from the next recorded entry.
    pub fn set_config(&mut self, config: HistoryConfig) {
        self.config = config;
    }

    /// Number of recorded entries (undoable plus redoable).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current position; entries before it can be undone.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn can_undo(&self) -> bool {
        self.batch.is_none() && self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.batch.is_none() && self.index < self.entries.len()
    }

    pub fn undo_kind(&self) -> Option<ActionKind> {
        self.index.checked_sub(1).map(|at| self.entries[at].kind)
    }

    pub fn redo_kind(&self) -> Option<ActionKind> {
        self.entries.get(self.index).map(|entry| entry.kind)
    }

    pub fn is_batch_open(&self) -> bool {
        self.batch.is_some()
    }

    /// Bytes held by recorded snapshots, including an open batch.
    pub fn memory_usage(&self) -> usize {
        self.memory + self.batch.as_ref().map_or(0, |batch| batch.memsize)
    }

    /// Entries dropped so far to stay within the limits.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Forget everything, including an open batch.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.batch = None;
        self.index = 0;
        self.memory = 0;
    }

    /// Apply an action now and record it. Inside a batch the changes join the
    /// batch; otherwise they become a new entry and redo entries are dropped.
    pub fn apply(&mut self, target: &mut EditTarget<'_>, action: Action) -> Result<(), HistoryError> {
        validate(target, &action)?;

        let mut entry = Entry::new(action.kind);
        for edit in action.edits {
            entry.record(perform(target, edit)?);
        }
        if entry.changes.is_empty() {
            return Ok(());
        }
        for change in &entry.changes {
            target.feed.emit(change.event());
        }
        entry.actions = 1;

        match &mut self.batch {
            Some(batch) => batch.absorb(entry),
            None => self.push(entry),
        }
        Ok(())
    }

    pub fn begin_batch(&mut self, kind: ActionKind) -> Result<(), HistoryError> {
        if self.batch.is_some() {
            return Err(HistoryError::BatchAlreadyOpen);
        }
        self.batch = Some(Entry::new(kind));
        Ok(())
    }

    /// Close the open batch and record it as one entry. An empty batch
    /// records nothing.
    pub fn commit_batch(&mut self) -> Result<(), HistoryError> {
        let mut batch = self.batch.take().ok_or(HistoryError::NoOpenBatch)?;
        if !batch.changes.is_empty() {
            // Grouping measures from when the batch lands, not when it opened.
            batch.stamp = Instant::now();
            debug!(actions = batch.actions, changes = batch.changes.len(), "committed batch");
            self.push(batch);
        }
        Ok(())
    }

    /// Roll back every action applied since `begin_batch` and forget them.
    pub fn cancel_batch(&mut self, target: &mut EditTarget<'_>) -> Result<(), HistoryError> {
        let batch = self.batch.as_ref().ok_or(HistoryError::NoOpenBatch)?;
        check_live(target, &batch.changes, Side::After)?;
        for change in batch.changes.iter().rev() {
            change.restore(target, Side::Before)?;
        }
        for change in &batch.changes {
            target.feed.emit(change.event());
        }
        self.batch = None;
        Ok(())
    }

    /// Restore the before-states of the current entry. `Ok(false)` at the
    /// start of history.
    pub fn undo(&mut self, target: &mut EditTarget<'_>) -> Result<bool, HistoryError> {
        if self.batch.is_some() {
            return Err(HistoryError::BatchOpen);
        }
        let Some(at) = self.index.checked_sub(1) else {
            return Ok(false);
        };
        let entry = &self.entries[at];
        check_live(target, &entry.changes, Side::After)?;
        for change in entry.changes.iter().rev() {
            change.restore(target, Side::Before)?;
        }
        for change in &entry.changes {
            target.feed.emit(change.event());
        }
        self.index = at;
        Ok(true)
    }

    /// Re-apply the after-states of the next entry. `Ok(false)` at the end of
    /// history.
    pub fn redo(&mut self, target: &mut EditTarget<'_>) -> Result<bool, HistoryError> {
        if self.batch.is_some() {
            return Err(HistoryError::BatchOpen);
        }
        let Some(entry) = self.entries.get(self.index) else {
            return Ok(false);
        };
        check_live(target, &entry.changes, Side::Before)?;
        for change in &entry.changes {
            change.restore(target, Side::After)?;
        }
        for change in &entry.changes {
            target.feed.emit(change.event());
        }
        self.index += 1;
        Ok(true)
    }

    fn push(&mut self, entry: Entry) {
        while self.entries.len() > self.index {
            if let Some(dropped) = self.entries.pop_back() {
                self.memory -= dropped.memsize;
            }
        }

        if self.config.group_actions {
            let window = Duration::from_millis(self.config.stacking_delay_ms);
            if let Some(last) = self.entries.back_mut() {
                if last.kind == entry.kind && entry.stamp.duration_since(last.stamp) <= window {
                    self.memory -= last.memsize;
                    last.absorb(entry);
                    self.memory += last.memsize;
                    self.evict();
                    return;
                }
            }
        }

        self.memory += entry.memsize;
        self.entries.push_back(entry);
        self.index = self.entries.len();
        self.evict();
    }

    /// Drop whole entries from the oldest end until within limits. The
    /// newest entry is always kept.
    fn evict(&mut self) {
        let budget = self.config.max_memory_bytes;
        let max_entries = self.config.max_entries;
        while self.entries.len() > 1 {
            let over_memory = budget > 0 && self.memory > budget;
            let over_count = max_entries > 0 && self.entries.len() > max_entries;
            if !(over_memory || over_count) {
                break;
            }
            let Some(oldest) = self.entries.pop_front() else {
                break;
            };
            self.memory -= oldest.memsize;
            self.index = self.index.saturating_sub(1);
            self.evicted += 1;
            debug!(
                freed = oldest.memsize,
                memory = self.memory,
                remaining = self.entries.len(),
                "evicted oldest undo entry"
            );
        }
    }
}

fn check_live(target: &EditTarget<'_>, changes: &[Change], side: Side) -> Result<(), HistoryError> {
    match changes.iter().find(|change| !change.matches_live(target, side)) {
        Some(change) => Err(HistoryError::Inconsistent(change.key())),
        None => Ok(()),
    }
}

/// Reject the whole action before anything is mutated.
fn validate(target: &EditTarget<'_>, action: &Action) -> Result<(), HistoryError> {
    for edit in &action.edits {
        match edit {
            Edit::SetTile(position, _) | Edit::Erase(position) if position.z > MAX_FLOOR => {
                return Err(StoreError::FloorOutOfRange(position.z).into());
            }
            Edit::MoveHouseExit { house_id, .. } if !target.houses.contains_key(house_id) => {
                return Err(HistoryError::UnknownHouse(*house_id));
            }
            Edit::MoveWaypoint { name, .. } if find_waypoint(target.waypoints, name).is_none() => {
                return Err(HistoryError::UnknownWaypoint(name.clone()));
            }
            _ => {}
        }
    }
    Ok(())
}

fn perform(target: &mut EditTarget<'_>, edit: Edit) -> Result<Change, HistoryError> {
    Ok(match edit {
        Edit::SetTile(position, tile) => {
            let after = (!tile.is_empty()).then(|| tile.clone());
            let before = target.store.set(position, tile)?;
            Change::Tile {
                position,
                before,
                after,
            }
        }
        Edit::Erase(position) => Change::Tile {
            position,
            before: target.store.erase(position),
            after: None,
        },
        Edit::MoveHouseExit { house_id, exit } => {
            let house = target
                .houses
                .get_mut(&house_id)
                .ok_or(HistoryError::UnknownHouse(house_id))?;
            let before = std::mem::replace(&mut house.exit, exit);
            Change::HouseExit {
                house_id,
                before,
                after: exit,
            }
        }
        Edit::MoveWaypoint { name, position } => {
            let waypoint = target
                .waypoints
                .iter_mut()
                .find(|w| w.name == name)
                .ok_or_else(|| HistoryError::UnknownWaypoint(name.clone()))?;
            let before = std::mem::replace(&mut waypoint.position, position);
            Change::Waypoint {
                name,
                before,
                after: position,
            }
        }
    })
}
