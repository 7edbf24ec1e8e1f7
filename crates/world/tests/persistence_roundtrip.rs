//! Save/load through the filesystem: plain and gzip files, backups,
//! companion files and background tasks.

use std::fs;

use mapforge_core::{Position, Tile};
use mapforge_testkit::{fingerprint, map_fingerprint, random_map, scratch_dir, town_map, RandomMapSpec};
use mapforge_world::otbm::{DecodeOptions, Recovery};
use mapforge_world::{
    backup_path, Action, ActionKind, LoadOptions, LoadTask, Map, MapError, MapEvent, SaveOptions,
    SaveTask, TaskControl, Warning,
};

#[test]
fn plain_and_gzip_files_hold_the_same_map() {
    let dir = scratch_dir("formats").unwrap();
    let plain = dir.path().join("town.otbm");
    let packed = dir.path().join("town.otgz");

    let mut map = Map::from_data(town_map());
    map.save(&plain).unwrap();
    map.save(&packed).unwrap();
    assert!(!map.has_changes());
    assert_eq!(map.path(), Some(packed.as_path()));

    let plain_bytes = fs::read(&plain).unwrap();
    let packed_bytes = fs::read(&packed).unwrap();
    assert_eq!(&packed_bytes[..2], &[0x1f, 0x8b]);
    assert_ne!(fingerprint(&plain_bytes), fingerprint(&packed_bytes));

    let expected = map_fingerprint(map.data()).unwrap();
    for path in [&plain, &packed] {
        let loaded = Map::load(path).unwrap();
        assert_eq!(loaded.data(), map.data());
        assert_eq!(map_fingerprint(loaded.data()).unwrap(), expected);
        assert!(loaded.warnings().is_empty());
        assert!(loaded.history().is_empty());
    }
}

#[test]
fn edits_survive_a_save_and_reload() {
    let dir = scratch_dir("edits").unwrap();
    let path = dir.path().join("edited.otbm");
    let mut map = Map::from_data(town_map());
    let pos = Position::new(110, 110, 7);
    map.apply(Action::new(ActionKind::Draw).set_tile(pos, Tile::with_ground(4526)))
        .unwrap();
    map.apply(Action::new(ActionKind::DeleteTiles).erase(Position::new(105, 92, 7)))
        .unwrap();
    assert!(map.has_changes());
    map.save(&path).unwrap();

    let loaded = Map::load(&path).unwrap();
    assert_eq!(loaded.store().get(pos), Some(&Tile::with_ground(4526)));
    assert!(loaded.store().get(Position::new(105, 92, 7)).is_none());
    // The lair spawn now sits on nothing.
    assert!(loaded
        .warnings()
        .contains(&Warning::DanglingSpawn { center: Position::new(105, 92, 7) }));
}

#[test]
fn saving_over_a_file_keeps_a_backup_on_request() {
    let dir = scratch_dir("backup").unwrap();
    let path = dir.path().join("map.otbm");
    let mut map = Map::from_data(town_map());
    map.save(&path).unwrap();
    let first = fs::read(&path).unwrap();

    map.apply(Action::new(ActionKind::Draw).set_tile(Position::new(1, 1, 7), Tile::with_ground(1)))
        .unwrap();
    let options = SaveOptions {
        keep_backup: true,
        ..SaveOptions::default()
    };
    map.save_with(&path, &options).unwrap();
    assert_eq!(fs::read(backup_path(&path)).unwrap(), first);
    assert_ne!(fs::read(&path).unwrap(), first);

    map.save(&path).unwrap();
    assert!(!backup_path(&path).exists());
}

#[test]
fn companions_are_written_beside_the_map() {
    let dir = scratch_dir("companions").unwrap();
    let path = dir.path().join("town.otbm");
    let mut map = Map::from_data(town_map());
    map.name_companions("town");
    map.save(&path).unwrap();
    assert!(dir.path().join("town-spawn.otbm").exists());
    assert!(dir.path().join("town-house.otbm").exists());

    let loaded = Map::load(&path).unwrap();
    assert_eq!(loaded.data().spawns, map.data().spawns);
    assert_eq!(loaded.data().houses, map.data().houses);
    assert_eq!(loaded.store(), map.store());
    assert!(loaded.warnings().is_empty(), "{:?}", loaded.warnings());

    fs::remove_file(dir.path().join("town-house.otbm")).unwrap();
    let partial = Map::load(&path).unwrap();
    assert!(partial.data().houses.is_empty());
    assert!(partial.warnings().iter().any(|w| matches!(
        w,
        Warning::MissingCompanion { path } if path.ends_with("town-house.otbm")
    )));
}

#[test]
fn damaged_files_load_with_best_effort() {
    let dir = scratch_dir("damaged").unwrap();
    let path = dir.path().join("damaged.otbm");
    Map::from_data(town_map()).save(&path).unwrap();

    // Ground attribute of the first tile becomes an unknown node type.
    let mut bytes = fs::read(&path).unwrap();
    let at = bytes
        .windows(2)
        .position(|w| w == [0xFE, 0x05])
        .expect("file has tiles");
    bytes[at + 1] = 0x07;
    fs::write(&path, &bytes).unwrap();

    assert!(matches!(Map::load(&path), Err(MapError::Format(_))));
    let options = LoadOptions {
        decode: DecodeOptions {
            recovery: Recovery::BestEffort,
            ..DecodeOptions::default()
        },
        ..LoadOptions::default()
    };
    let map = Map::load_with(&path, &options).unwrap();
    assert!(map
        .warnings()
        .iter()
        .any(|w| matches!(w, Warning::SkippedArea { .. })));
    assert!(map.store().len() < town_map().store.len());
}

#[test]
fn missing_files_are_io_errors() {
    let dir = scratch_dir("missing").unwrap();
    let err = Map::load(dir.path().join("nowhere.otbm")).unwrap_err();
    assert!(matches!(err, MapError::Io { .. }));
}

#[test]
fn background_save_then_load_matches_a_random_map() {
    let dir = scratch_dir("tasks").unwrap();
    let path = dir.path().join("random.otgz");
    let data = random_map(
        42,
        RandomMapSpec {
            size: 2048,
            tiles: 2000,
            ..RandomMapSpec::default()
        },
    );

    let save = SaveTask::save(&path, data.clone(), SaveOptions::default(), TaskControl::new())
        .unwrap();
    save.wait().unwrap();

    let load = LoadTask::load(&path, DecodeOptions::default(), TaskControl::new()).unwrap();
    let decoded = load.wait().unwrap();
    assert_eq!(decoded.map, data);

    let mut map = Map::new(256, 256);
    let events = map.subscribe();
    map.replace_with(decoded, Some(path.clone()));
    assert_eq!(map.data(), &data);
    assert_eq!(events.try_recv(), Ok(MapEvent::MapReloaded));
}

#[test]
fn cancelled_tasks_leave_the_target_alone() {
    let dir = scratch_dir("cancel").unwrap();
    let path = dir.path().join("cancelled.otbm");
    let control = TaskControl::new();
    control.cancel();
    let save = SaveTask::save(&path, town_map(), SaveOptions::default(), control).unwrap();
    assert!(matches!(save.wait(), Err(MapError::Cancelled)));
    assert!(!path.exists());
}
