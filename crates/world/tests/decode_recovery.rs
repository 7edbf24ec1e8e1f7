//! Strict versus best-effort decoding of damaged files, and the non-fatal
//! warnings a clean decode can still produce.

use mapforge_core::{Position, Tile};
use mapforge_world::otbm::node::{self, NodeWriter};
use mapforge_world::otbm::{decode_map, DecodeOptions, Recovery};
use mapforge_world::{MapError, Warning};

fn map_file(size: u16, body: impl FnOnce(&mut NodeWriter)) -> Vec<u8> {
    let mut w = NodeWriter::new();
    w.raw(b"OTBM");
    w.start(node::ROOT);
    w.u32(2);
    w.u16(size);
    w.u16(size);
    w.u32(3);
    w.u32(57);
    w.start(node::MAP_DATA);
    body(&mut w);
    w.end();
    w.end();
    w.finish()
}

fn area(w: &mut NodeWriter, x: u16, y: u16, z: u8, tiles: impl FnOnce(&mut NodeWriter)) {
    w.start(node::TILE_AREA);
    w.u16(x);
    w.u16(y);
    w.u8(z);
    tiles(w);
    w.end();
}

fn ground_tile(w: &mut NodeWriter, x: u8, y: u8, ground: u16) {
    w.start(node::TILE);
    w.u8(x);
    w.u8(y);
    w.u8(9);
    w.u16(ground);
    w.end();
}

fn best_effort() -> DecodeOptions {
    DecodeOptions {
        recovery: Recovery::BestEffort,
        ..DecodeOptions::default()
    }
}

/// Three areas; the middle one holds a tile whose payload stops after x.
fn damaged_middle_area() -> Vec<u8> {
    map_file(1024, |w| {
        area(w, 0, 0, 7, |w| ground_tile(w, 1, 1, 100));
        area(w, 256, 0, 7, |w| {
            ground_tile(w, 2, 2, 100);
            w.start(node::TILE);
            w.u8(3);
            w.end();
        });
        area(w, 512, 0, 7, |w| ground_tile(w, 4, 4, 100));
    })
}

#[test]
fn strict_mode_fails_on_a_bad_tile() {
    let err = decode_map(&damaged_middle_area(), &DecodeOptions::default()).unwrap_err();
    match err {
        MapError::Format(format) => {
            assert!(format.reason.contains("tile y"), "{format}");
            assert_eq!(format.path.to_string(), "ROOT/MAP_DATA/TILE_AREA/TILE");
        }
        other => panic!("expected a format error, got {other}"),
    }
}

#[test]
fn best_effort_skips_only_the_damaged_area() {
    let decoded = decode_map(&damaged_middle_area(), &best_effort()).unwrap();
    let store = &decoded.map.store;
    assert!(store.get(Position::new(1, 1, 7)).is_some());
    assert!(store.get(Position::new(516, 4, 7)).is_some());
    // The whole middle area goes, including its valid tile.
    assert!(store.get(Position::new(258, 2, 7)).is_none());
    assert_eq!(store.len(), 2);

    assert_eq!(decoded.warnings.len(), 1);
    assert!(matches!(
        &decoded.warnings[0],
        Warning::SkippedArea { reason, .. } if reason.contains("tile y")
    ));
}

#[test]
fn best_effort_skips_an_area_with_a_bad_header() {
    let file = map_file(512, |w| {
        area(w, 0, 0, 16, |w| ground_tile(w, 1, 1, 100));
        area(w, 0, 0, 7, |w| ground_tile(w, 1, 1, 100));
    });
    assert!(decode_map(&file, &DecodeOptions::default()).is_err());

    let decoded = decode_map(&file, &best_effort()).unwrap();
    assert_eq!(decoded.map.store.len(), 1);
    assert!(matches!(decoded.warnings[..], [Warning::SkippedArea { .. }]));
}

#[test]
fn framing_errors_are_fatal_even_in_best_effort() {
    let file = map_file(512, |w| {
        area(w, 0, 0, 7, |w| {
            w.start(node::TILE);
            w.u8(1);
            w.u8(1);
            // Escape followed by a byte that is not a marker.
            w.raw(&[0xFD, 0x00]);
            w.end();
        });
    });
    assert!(matches!(
        decode_map(&file, &best_effort()),
        Err(MapError::Format(_))
    ));
}

#[test]
fn errors_outside_areas_are_fatal_even_in_best_effort() {
    let file = map_file(512, |w| {
        w.start(node::TOWNS);
        w.start(node::TOWN);
        w.u32(1);
        w.end();
        w.end();
    });
    assert!(matches!(
        decode_map(&file, &best_effort()),
        Err(MapError::Format(_))
    ));
}

#[test]
fn truncated_files_are_format_errors() {
    let file = damaged_middle_area();
    for cut in [0, 3, 6, 20, file.len() / 2, file.len() - 1] {
        let err = decode_map(&file[..cut], &best_effort()).unwrap_err();
        assert!(
            matches!(err, MapError::Format(_)),
            "cut at {cut}: {err}"
        );
    }
}

#[test]
fn trailing_bytes_after_root_are_rejected() {
    let mut file = map_file(512, |_| {});
    file.push(0x00);
    assert!(matches!(
        decode_map(&file, &DecodeOptions::default()),
        Err(MapError::Format(_))
    ));
}

#[test]
fn out_of_bounds_areas_load_with_a_warning() {
    let file = map_file(256, |w| area(w, 512, 0, 7, |w| ground_tile(w, 1, 1, 100)));
    let decoded = decode_map(&file, &DecodeOptions::default()).unwrap();
    assert!(decoded.map.store.get(Position::new(513, 1, 7)).is_some());
    assert_eq!(
        decoded.warnings,
        vec![Warning::OutOfBoundsArea {
            base: Position::new(512, 0, 7)
        }]
    );
}

#[test]
fn duplicate_tiles_keep_the_later_one() {
    let file = map_file(256, |w| {
        area(w, 0, 0, 7, |w| {
            ground_tile(w, 1, 1, 100);
            ground_tile(w, 1, 1, 200);
        })
    });
    let decoded = decode_map(&file, &DecodeOptions::default()).unwrap();
    assert_eq!(
        decoded.map.store.get(Position::new(1, 1, 7)),
        Some(&Tile::with_ground(200))
    );
    assert_eq!(
        decoded.warnings,
        vec![Warning::DuplicateTile {
            position: Position::new(1, 1, 7)
        }]
    );
}

#[test]
fn dangling_spawns_are_reported() {
    let file = map_file(256, |w| {
        area(w, 0, 0, 7, |w| ground_tile(w, 1, 1, 100));
        w.start(node::SPAWNS);
        for (x, y) in [(1u16, 1u16), (50, 50)] {
            w.start(node::SPAWN_AREA);
            w.u16(x);
            w.u16(y);
            w.u8(7);
            w.u16(2);
            w.u32(60);
            w.end();
        }
        w.end();
    });
    let decoded = decode_map(&file, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.map.spawns.len(), 2);
    assert_eq!(
        decoded.warnings,
        vec![Warning::DanglingSpawn {
            center: Position::new(50, 50, 7)
        }]
    );
}

fn name(w: &mut NodeWriter, text: &str) {
    w.u16(text.len() as u16);
    w.bytes(text.as_bytes());
}

#[test]
fn repeated_spawn_centers_keep_the_later_spawn() {
    let file = map_file(256, |w| {
        area(w, 0, 0, 7, |w| ground_tile(w, 1, 1, 100));
        w.start(node::SPAWNS);
        for monster in ["Rat", "Dragon"] {
            w.start(node::SPAWN_AREA);
            w.u16(1);
            w.u16(1);
            w.u8(7);
            w.u16(2);
            w.u32(60);
            w.start(node::MONSTER);
            name(w, monster);
            w.u16(1);
            w.end();
            w.end();
        }
        w.end();
    });
    let decoded = decode_map(&file, &DecodeOptions::default()).unwrap();
    let center = Position::new(1, 1, 7);
    assert_eq!(decoded.map.spawns.len(), 1);
    assert_eq!(decoded.map.spawns[&center].entries[0].name, "Dragon");
    assert_eq!(decoded.warnings, vec![Warning::DuplicateSpawn { center }]);
}

#[test]
fn repeated_house_ids_keep_the_later_house() {
    let file = map_file(256, |w| {
        area(w, 0, 0, 7, |w| ground_tile(w, 1, 1, 100));
        w.start(node::HOUSES);
        for (house, rent) in [("Old Lane 1", 100u32), ("Old Lane 2", 250)] {
            w.start(node::HOUSE);
            w.u32(7);
            name(w, house);
            w.u32(1);
            w.u32(rent);
            w.u8(0);
            w.u16(0);
            w.u16(0);
            w.u8(0);
            w.end();
        }
        w.end();
    });
    let decoded = decode_map(&file, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded.map.houses.len(), 1);
    assert_eq!(decoded.map.houses[&7].name, "Old Lane 2");
    assert_eq!(decoded.map.houses[&7].rent, 250);
    assert_eq!(
        decoded.warnings,
        vec![Warning::DuplicateHouse { house_id: 7 }]
    );
}

#[test]
fn missing_map_data_is_an_error() {
    let mut w = NodeWriter::new();
    w.raw(b"OTBM");
    w.start(node::ROOT);
    w.u32(2);
    w.u16(256);
    w.u16(256);
    w.u32(3);
    w.u32(57);
    w.end();
    let err = decode_map(&w.finish(), &DecodeOptions::default()).unwrap_err();
    assert!(err.to_string().contains("MAP_DATA"), "{err}");
}
