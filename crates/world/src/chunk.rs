use std::fmt;
use std::sync::Arc;

use mapforge_core::{Area, Position, Tile};

/// Chunk edge length in tiles. Matches the on-disk tile area size.
pub const CHUNK_SIZE: usize = 256;
/// Leaf edge length in tiles.
pub const LEAF_SIZE: usize = 4;
/// Leaves along one chunk edge.
pub const LEAVES_PER_SIDE: usize = CHUNK_SIZE / LEAF_SIZE;
/// Leaves per chunk.
pub const LEAF_COUNT: usize = LEAVES_PER_SIDE * LEAVES_PER_SIDE;
/// Tiles per leaf.
pub const LEAF_TILES: usize = LEAF_SIZE * LEAF_SIZE;

/// Chunk coordinate: area indices on one floor.
/// Field order gives the derived `Ord` floor, then row, then column, which is
/// the order chunks are written to disk.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct ChunkPos {
    pub z: u8,
    pub y: u8,
    pub x: u8,
}

impl ChunkPos {
    pub const fn new(x: u8, y: u8, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing `pos`.
    #[inline]
    pub fn of(pos: Position) -> Self {
        Self {
            x: (pos.x >> 8) as u8,
            y: (pos.y >> 8) as u8,
            z: pos.z,
        }
    }

    /// Top-left tile of the chunk.
    pub fn base(self) -> Position {
        Position::new(u16::from(self.x) << 8, u16::from(self.y) << 8, self.z)
    }

    /// Every position the chunk covers.
    pub fn area(self) -> Area {
        let base = self.base();
        Area::floor(base.x, base.y, base.x | 0xFF, base.y | 0xFF, self.z)
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    /// Dirty flags set whenever chunk data changes.
    pub struct DirtyFlags: u8 {
        const SAVE = 0b0000_0001;
        const RENDER = 0b0000_0010;
    }
}

impl Default for DirtyFlags {
    fn default() -> Self {
        DirtyFlags::empty()
    }
}

#[derive(Debug, Clone, Default)]
struct Leaf {
    tiles: [Option<Tile>; LEAF_TILES],
    count: usize,
}

/// In-chunk coordinates to (leaf index, slot in leaf).
#[inline]
fn slot(local_x: u8, local_y: u8) -> (usize, usize) {
    let (x, y) = (usize::from(local_x), usize::from(local_y));
    let leaf = (y / LEAF_SIZE) * LEAVES_PER_SIDE + x / LEAF_SIZE;
    let index = (y % LEAF_SIZE) * LEAF_SIZE + x % LEAF_SIZE;
    (leaf, index)
}

#[inline]
fn local_of(leaf: usize, index: usize) -> (u8, u8) {
    let x = (leaf % LEAVES_PER_SIDE) * LEAF_SIZE + index % LEAF_SIZE;
    let y = (leaf / LEAVES_PER_SIDE) * LEAF_SIZE + index / LEAF_SIZE;
    (x as u8, y as u8)
}

/// 256×256 tiles of one floor, stored as lazily allocated 4×4 leaves.
///
/// Leaves are reference counted, so cloning a chunk shares them and the first
/// write to a shared leaf copies only that leaf.
#[derive(Debug, Clone)]
pub struct Chunk {
    position: ChunkPos,
    leaves: Vec<Option<Arc<Leaf>>>,
    tile_count: usize,
    reserved: Vec<u8>,
    dirty: DirtyFlags,
}

impl Chunk {
    /// Allocate an empty chunk.
    pub fn new(position: ChunkPos) -> Self {
        Self {
            position,
            leaves: vec![None; LEAF_COUNT],
            tile_count: 0,
            reserved: Vec::new(),
            dirty: DirtyFlags::all(),
        }
    }

    #[inline]
    pub fn position(&self) -> ChunkPos {
        self.position
    }

    /// Number of stored tiles.
    #[inline]
    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    /// True when no tile is stored.
    pub fn is_empty(&self) -> bool {
        self.tile_count == 0
    }

    /// Trailing tile area bytes this build does not understand.
    pub fn reserved(&self) -> &[u8] {
        &self.reserved
    }

    pub fn set_reserved(&mut self, bytes: Vec<u8>) {
        self.reserved = bytes;
        self.dirty.insert(DirtyFlags::SAVE);
    }

    /// Fetch the tile at in-chunk coordinates.
    pub fn tile(&self, local_x: u8, local_y: u8) -> Option<&Tile> {
        let (leaf, index) = slot(local_x, local_y);
        self.leaves[leaf].as_ref()?.tiles[index].as_ref()
    }

    /// Store a tile, returning the previous one. An empty tile removes.
    pub fn set_tile(&mut self, local_x: u8, local_y: u8, tile: Tile) -> Option<Tile> {
        if tile.is_empty() {
            return self.remove_tile(local_x, local_y);
        }
        let (leaf, index) = slot(local_x, local_y);
        let leaf = Arc::make_mut(self.leaves[leaf].get_or_insert_with(Default::default));
        let previous = leaf.tiles[index].replace(tile);
        if previous.is_none() {
            leaf.count += 1;
            self.tile_count += 1;
        }
        self.dirty.insert(DirtyFlags::SAVE | DirtyFlags::RENDER);
        previous
    }

    /// Remove and return a tile.
    pub fn remove_tile(&mut self, local_x: u8, local_y: u8) -> Option<Tile> {
        let (leaf_index, index) = slot(local_x, local_y);
        let shared = self.leaves[leaf_index].as_mut()?;
        shared.tiles[index].as_ref()?;

        let leaf = Arc::make_mut(shared);
        let previous = leaf.tiles[index].take();
        leaf.count -= 1;
        if leaf.count == 0 {
            self.leaves[leaf_index] = None;
        }
        self.tile_count -= 1;
        self.dirty.insert(DirtyFlags::SAVE | DirtyFlags::RENDER);
        previous
    }

    /// Iterate stored tiles in leaf order with their in-chunk coordinates.
    pub fn tiles(&self) -> impl Iterator<Item = (u8, u8, &Tile)> + '_ {
        self.leaves
            .iter()
            .enumerate()
            .filter_map(|(leaf_index, leaf)| leaf.as_ref().map(|leaf| (leaf_index, leaf)))
            .flat_map(|(leaf_index, leaf)| {
                leaf.tiles.iter().enumerate().filter_map(move |(index, tile)| {
                    let (x, y) = local_of(leaf_index, index);
                    tile.as_ref().map(|tile| (x, y, tile))
                })
            })
    }

    /// Iterate stored tiles with absolute positions, in leaf order.
    pub fn positioned_tiles(&self) -> impl Iterator<Item = (Position, &Tile)> + '_ {
        let base = self.position.base();
        self.tiles().map(move |(x, y, tile)| {
            (
                Position::new(base.x | u16::from(x), base.y | u16::from(y), base.z),
                tile,
            )
        })
    }

    /// Current dirty flags.
    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    /// Consume and return the current dirty flags.
    pub fn take_dirty_flags(&mut self) -> DirtyFlags {
        let flags = self.dirty;
        self.dirty = DirtyFlags::empty();
        flags
    }
}
