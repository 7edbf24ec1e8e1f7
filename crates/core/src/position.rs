//! Map coordinates.
//!
//! Positions address a single tile. `x`/`y` span the full 16-bit map plane and
//! `z` is a floor index; floor 7 is the surface, lower numbers are above
//! ground and higher numbers below.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest valid floor index.
pub const MAX_FLOOR: u8 = 15;

/// Number of floors a map can hold.
pub const FLOOR_COUNT: usize = MAX_FLOOR as usize + 1;

/// Surface floor.
pub const GROUND_FLOOR: u8 = 7;

/// Tile coordinate.
///
/// Ordering is by floor first, then row, then column, which matches the
/// order chunks and tiles are written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// Column.
    pub x: u16,
    /// Row.
    pub y: u16,
    /// Floor index.
    pub z: u8,
}

impl Position {
    /// Construct a position.
    pub const fn new(x: u16, y: u16, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Whether the floor index is inside `0..=MAX_FLOOR`.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.z <= MAX_FLOOR
    }

    /// Offset by a signed delta, returning `None` when the result leaves the
    /// addressable plane or floor range.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Option<Self> {
        let x = i32::from(self.x) + dx;
        let y = i32::from(self.y) + dy;
        let z = i32::from(self.z) + dz;

        if x < 0 || y < 0 || z < 0 {
            return None;
        }
        if x > i32::from(u16::MAX) || y > i32::from(u16::MAX) || z > i32::from(MAX_FLOOR) {
            return None;
        }

        Some(Self {
            x: x as u16,
            y: y as u16,
            z: z as u8,
        })
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.z, self.y, self.x).cmp(&(other.z, other.y, other.x))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Inclusive box of positions, possibly spanning several floors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Area {
    /// Lowest corner on every axis.
    pub min: Position,
    /// Highest corner on every axis.
    pub max: Position,
}

impl Area {
    /// Build an area from two opposite corners in any order.
    pub fn new(a: Position, b: Position) -> Self {
        Self {
            min: Position::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Position::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// Area covering a single floor rectangle.
    pub fn floor(x0: u16, y0: u16, x1: u16, y1: u16, z: u8) -> Self {
        Self::new(Position::new(x0, y0, z), Position::new(x1, y1, z))
    }

    /// Every position on every floor.
    pub fn everything() -> Self {
        Self {
            min: Position::new(0, 0, 0),
            max: Position::new(u16::MAX, u16::MAX, MAX_FLOOR),
        }
    }

    /// Whether `pos` lies inside the box.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= self.min.x
            && pos.x <= self.max.x
            && pos.y >= self.min.y
            && pos.y <= self.max.y
            && pos.z >= self.min.z
            && pos.z <= self.max.z
    }

    /// Whether two areas share at least one position.
    pub fn intersects(&self, other: &Area) -> bool {
        self.min.x <= other.max.x
            && other.min.x <= self.max.x
            && self.min.y <= other.max.y
            && other.min.y <= self.max.y
            && self.min.z <= other.max.z
            && other.min.z <= self.max.z
    }

    /// Number of positions covered; zero when `min` exceeds `max` on any axis.
    pub fn volume(&self) -> u64 {
        span(self.min.x, self.max.x)
            * span(self.min.y, self.max.y)
            * span(u16::from(self.min.z), u16::from(self.max.z))
    }
}

fn span(lo: u16, hi: u16) -> u64 {
    if hi < lo {
        0
    } else {
        u64::from(hi - lo) + 1
    }
}
