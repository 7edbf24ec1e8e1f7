//! OTBM node tree codec.
//!
//! Decoding and encoding are stateless functions between bytes and
//! [`MapData`]. Anything the decoder does not understand (reserved bytes,
//! unknown attributes, unknown flag bits) is carried in the decoded value and
//! written back unchanged.

pub mod attributes;
mod decode;
mod encode;
pub mod node;
pub mod props;
pub mod remap;

use std::collections::BTreeSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use decode::{decode_houses, decode_map, decode_map_observed, decode_spawns};
pub use encode::{encode_houses, encode_map, encode_map_observed, encode_spawns};
pub use node::node_name;
pub use remap::{ItemIdMap, RemapRegistry};

use crate::{MapData, Warning};

/// Identifier written by current tools.
pub const IDENTIFIER: [u8; 4] = *b"OTBM";
/// Identifier written by older tools; accepted and preserved.
pub const IDENTIFIER_ZERO: [u8; 4] = [0; 4];
/// Newest OTBM version this build reads and writes (OTBM 4).
pub const NEWEST_VERSION: u32 = 3;

/// MAP_DATA attributes.
pub(crate) const ATTR_DESCRIPTION: u8 = 1;
pub(crate) const ATTR_EXT_SPAWN_FILE: u8 = 11;
pub(crate) const ATTR_EXT_HOUSE_FILE: u8 = 13;
/// Tile attributes.
pub(crate) const ATTR_TILE_FLAGS: u8 = 3;
pub(crate) const ATTR_GROUND: u8 = 9;

/// How the decoder reacts to a malformed tile area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// Abort on the first error.
    #[default]
    Strict,
    /// Skip a malformed tile area whose framing is intact and record a
    /// [`Warning::SkippedArea`].
    BestEffort,
}

#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    pub recovery: Recovery,
    pub remap: Arc<RemapRegistry>,
}

#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// OTBM version to write; the header's version when `None`.
    pub target_version: Option<u32>,
    pub remap: Arc<RemapRegistry>,
}

/// A decoded map and everything non-fatal found on the way.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub map: MapData,
    pub warnings: Vec<Warning>,
}

/// Progress of a long running decode or encode, reported once per tile area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Bytes consumed out of the input length.
    Reading { offset: usize, total: usize },
    /// Tile areas written out of the chunk count.
    Writing { areas: usize, total: usize },
}

/// Observer called at tile area boundaries; `Break` cancels.
pub type Observer<'a> = dyn FnMut(Progress) -> ControlFlow<()> + 'a;

/// Spawn centers that fall outside the map or on a position without a tile.
pub fn check_spawn_references(map: &MapData) -> Vec<Warning> {
    let header = &map.header;
    map.spawns
        .keys()
        .filter(|center| {
            center.x >= header.width || center.y >= header.height || map.store.get(**center).is_none()
        })
        .map(|&center| Warning::DanglingSpawn { center })
        .collect()
}

/// Tiles that reference a house the map does not define, one warning per id.
pub fn check_house_references(map: &MapData) -> Vec<Warning> {
    let mut reported = BTreeSet::new();
    let mut warnings = Vec::new();
    for (position, tile) in map.store.iter() {
        let Some(house_id) = tile.house_id else {
            continue;
        };
        if !map.houses.contains_key(&house_id) && reported.insert(house_id) {
            warnings.push(Warning::DanglingHouse { house_id, position });
        }
    }
    warnings
}

/// Both reference checks.
pub fn check_references(map: &MapData) -> Vec<Warning> {
    let mut warnings = check_spawn_references(map);
    warnings.extend(check_house_references(map));
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapforge_core::{House, Position, Spawn, Tile};

    #[test]
    fn dangling_references_are_reported_once() {
        let mut map = MapData::new(256, 256);
        let housed = Tile {
            house_id: Some(9),
            ..Tile::with_ground(1)
        };
        map.store.set(Position::new(10, 10, 7), housed.clone()).unwrap();
        map.store.set(Position::new(11, 10, 7), housed).unwrap();
        map.spawns.insert(
            Position::new(10, 10, 7),
            Spawn::new(Position::new(10, 10, 7), 2),
        );
        map.spawns.insert(
            Position::new(50, 50, 7),
            Spawn::new(Position::new(50, 50, 7), 2),
        );

        let warnings = check_references(&map);
        assert_eq!(
            warnings,
            vec![
                Warning::DanglingSpawn {
                    center: Position::new(50, 50, 7)
                },
                Warning::DanglingHouse {
                    house_id: 9,
                    position: Position::new(10, 10, 7)
                },
            ]
        );

        map.houses.insert(9, House::new(9, "Harbour Street 1"));
        assert_eq!(check_house_references(&map), vec![]);
    }
}
