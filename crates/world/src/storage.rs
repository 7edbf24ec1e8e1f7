use std::collections::BTreeMap;
use std::sync::Arc;

use mapforge_core::{Area, Position, Tile, MAX_FLOOR};

use crate::{Chunk, ChunkPos, DirtyFlags, StoreError};

/// Sparse tile container grouped into chunks.
/// Uses BTreeMap so chunk iteration order is deterministic (floor, row,
/// column), which is also the order chunks are encoded in.
///
/// Chunks are `Arc`-shared: cloning the store is a cheap snapshot and the
/// first write afterwards copies only the touched chunk and leaf.
#[derive(Debug, Clone, Default)]
pub struct TileStore {
    chunks: BTreeMap<ChunkPos, Arc<Chunk>>,
    len: usize,
}

impl TileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tiles.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when no tiles are stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Fetch the tile at `pos`. Never allocates.
    pub fn get(&self, pos: Position) -> Option<&Tile> {
        let chunk = self.chunks.get(&ChunkPos::of(pos))?;
        chunk.tile(pos.x as u8, pos.y as u8)
    }

    /// Store `tile` at `pos`, returning the previous tile. An empty tile is
    /// the same as [`TileStore::erase`].
    pub fn set(&mut self, pos: Position, tile: Tile) -> Result<Option<Tile>, StoreError> {
        if pos.z > MAX_FLOOR {
            return Err(StoreError::FloorOutOfRange(pos.z));
        }
        if tile.is_empty() {
            return Ok(self.erase(pos));
        }
        let chunk = self.ensure_chunk(ChunkPos::of(pos));
        let previous = chunk.set_tile(pos.x as u8, pos.y as u8, tile);
        if previous.is_none() {
            self.len += 1;
        }
        Ok(previous)
    }

    /// Remove and return the tile at `pos`. A chunk left without tiles or
    /// reserved bytes is released.
    pub fn erase(&mut self, pos: Position) -> Option<Tile> {
        let key = ChunkPos::of(pos);
        let shared = self.chunks.get_mut(&key)?;
        shared.tile(pos.x as u8, pos.y as u8)?;

        let chunk = Arc::make_mut(shared);
        let previous = chunk.remove_tile(pos.x as u8, pos.y as u8);
        let release = chunk.is_empty() && chunk.reserved().is_empty();
        if release {
            self.chunks.remove(&key);
        }
        self.len -= 1;
        previous
    }

    /// Obtain mutable access to a chunk, creating it if necessary.
    pub fn ensure_chunk(&mut self, pos: ChunkPos) -> &mut Chunk {
        let shared = self
            .chunks
            .entry(pos)
            .or_insert_with(|| Arc::new(Chunk::new(pos)));
        Arc::make_mut(shared)
    }

    /// Attempt to fetch a chunk immutably.
    pub fn chunk_at(&self, pos: ChunkPos) -> Option<&Chunk> {
        self.chunks.get(&pos).map(Arc::as_ref)
    }

    /// Iterate chunks in storage order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> + '_ {
        self.chunks.values().map(Arc::as_ref)
    }

    /// Lazily iterate the tiles inside `area`, chunk by chunk.
    pub fn tiles_in(&self, area: Area) -> impl Iterator<Item = (Position, &Tile)> + '_ {
        let first = ChunkPos::new(0, 0, area.min.z);
        let last = ChunkPos::new(u8::MAX, u8::MAX, area.max.z);
        self.chunks
            .range(first..=last)
            .filter(move |(key, _)| key.area().intersects(&area))
            .flat_map(move |(_, chunk)| {
                chunk
                    .positioned_tiles()
                    .filter(move |(pos, _)| area.contains(*pos))
            })
    }

    /// Iterate every tile in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (Position, &Tile)> + '_ {
        self.chunks.values().flat_map(|chunk| chunk.positioned_tiles())
    }

    /// True when no tile lies inside `area`.
    pub fn is_region_empty(&self, area: Area) -> bool {
        self.tiles_in(area).next().is_none()
    }

    /// Consume the dirty flags of every chunk that has any set.
    pub fn take_dirty(&mut self) -> Vec<(ChunkPos, DirtyFlags)> {
        let mut taken = Vec::new();
        for (key, shared) in self.chunks.iter_mut() {
            if shared.dirty_flags().is_empty() {
                continue;
            }
            taken.push((*key, Arc::make_mut(shared).take_dirty_flags()));
        }
        taken
    }

    /// Drop every chunk.
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }
}

impl PartialEq for TileStore {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len
            && self.chunks.len() == other.chunks.len()
            && self.chunks.iter().zip(other.chunks.iter()).all(|((ka, a), (kb, b))| {
                ka == kb
                    && a.reserved() == b.reserved()
                    && a.tile_count() == b.tile_count()
                    && a.tiles().eq(b.tiles())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapforge_core::Item;

    fn ground_id(store: &TileStore, pos: Position) -> Option<u16> {
        store.get(pos)?.ground.as_ref().map(|g| g.id)
    }

    #[test]
    fn get_untouched_position_allocates_nothing() {
        let store = TileStore::new();
        assert!(store.get(Position::new(500, 500, 7)).is_none());
        assert_eq!(store.chunk_count(), 0);
    }

    #[test]
    fn set_get_erase() {
        let mut store = TileStore::new();
        let pos = Position::new(100, 100, 7);
        assert_eq!(store.set(pos, Tile::with_ground(1)).unwrap(), None);
        assert_eq!(ground_id(&store, pos), Some(1));
        assert_eq!(store.len(), 1);

        assert!(store.erase(pos).is_some());
        assert!(store.get(pos).is_none());
        assert!(store.is_empty());
        assert_eq!(store.chunk_count(), 0);
        assert!(store.erase(pos).is_none());
    }

    #[test]
    fn set_empty_tile_erases() {
        let mut store = TileStore::new();
        let pos = Position::new(1, 1, 7);
        store.set(pos, Tile::with_ground(5)).unwrap();
        let previous = store.set(pos, Tile::default()).unwrap();
        assert!(previous.is_some());
        assert!(store.iter().next().is_none());
    }

    #[test]
    fn floor_out_of_range_is_rejected() {
        let mut store = TileStore::new();
        let err = store.set(Position::new(0, 0, 16), Tile::with_ground(1));
        assert_eq!(err, Err(StoreError::FloorOutOfRange(16)));
        assert!(store.is_empty());
    }

    #[test]
    fn tiles_in_filters_by_area_across_chunks() {
        let mut store = TileStore::new();
        for pos in [
            Position::new(250, 10, 7),
            Position::new(260, 10, 7),
            Position::new(600, 10, 7),
            Position::new(255, 10, 6),
        ] {
            store.set(pos, Tile::with_ground(1)).unwrap();
        }
        let found: Vec<_> = store
            .tiles_in(Area::floor(200, 0, 300, 20, 7))
            .map(|(pos, _)| pos)
            .collect();
        assert_eq!(found, vec![Position::new(250, 10, 7), Position::new(260, 10, 7)]);

        // Restartable: a second pass sees the same tiles.
        assert_eq!(store.tiles_in(Area::floor(200, 0, 300, 20, 7)).count(), 2);
        assert!(store.is_region_empty(Area::floor(0, 0, 100, 100, 7)));
        assert!(!store.is_region_empty(Area::floor(0, 0, 300, 300, 6)));
    }

    #[test]
    fn iteration_is_floor_major() {
        let mut store = TileStore::new();
        store.set(Position::new(0, 0, 8), Tile::with_ground(1)).unwrap();
        store.set(Position::new(300, 0, 7), Tile::with_ground(1)).unwrap();
        store.set(Position::new(0, 300, 7), Tile::with_ground(1)).unwrap();
        let order: Vec<_> = store.iter().map(|(pos, _)| pos).collect();
        assert_eq!(
            order,
            vec![
                Position::new(300, 0, 7),
                Position::new(0, 300, 7),
                Position::new(0, 0, 8),
            ]
        );
    }

    #[test]
    fn snapshot_is_unaffected_by_later_edits() {
        let mut store = TileStore::new();
        let pos = Position::new(10, 10, 7);
        store.set(pos, Tile::with_ground(1).stacked(Item::new(2))).unwrap();
        let snapshot = store.clone();

        store.set(pos, Tile::with_ground(9)).unwrap();
        store.erase(pos);
        assert_eq!(ground_id(&snapshot, pos), Some(1));
        assert_eq!(snapshot.len(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn take_dirty_reports_touched_chunks() {
        let mut store = TileStore::new();
        store.set(Position::new(0, 0, 7), Tile::with_ground(1)).unwrap();
        let dirty = store.take_dirty();
        assert_eq!(dirty.len(), 1);
        assert!(dirty[0].1.contains(DirtyFlags::SAVE));
        assert!(store.take_dirty().is_empty());
    }

    #[test]
    fn equality_compares_tiles() {
        let mut a = TileStore::new();
        let mut b = TileStore::new();
        a.set(Position::new(1, 2, 7), Tile::with_ground(1)).unwrap();
        assert_ne!(a, b);
        b.set(Position::new(1, 2, 7), Tile::with_ground(1)).unwrap();
        assert_eq!(a, b);
    }
}
