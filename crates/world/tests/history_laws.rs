//! Undo/redo laws exercised through the `Map` surface.

use mapforge_core::{Creature, Item, Position, Tile};
use mapforge_testkit::town_map;
use mapforge_world::{
    Action, ActionKind, ChangeKey, Edit, HistoryConfig, HistoryError, Map, MapData, MapEvent,
};
use proptest::prelude::*;

fn edit_strategy() -> impl Strategy<Value = Edit> {
    let position = (0u16..6, 0u16..6, 6u8..9).prop_map(|(x, y, z)| Position::new(x, y, z));
    prop_oneof![
        (position.clone(), 1u16..50, prop::option::of(1u16..50)).prop_map(|(pos, ground, item)| {
            let mut tile = Tile::with_ground(ground);
            if let Some(id) = item {
                tile.items.push(Item::new(id));
            }
            Edit::SetTile(pos, tile)
        }),
        position.prop_map(Edit::Erase),
    ]
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop::collection::vec(edit_strategy(), 1..12).prop_map(|edits| {
        let mut action = Action::new(ActionKind::Draw);
        for edit in edits {
            action.push(edit);
        }
        action
    })
}

fn seeded_map(seed: &[Edit]) -> Map {
    let mut map = Map::new(256, 256);
    for edit in seed {
        match edit {
            Edit::SetTile(pos, tile) => {
                map.store_mut().set(*pos, tile.clone()).unwrap();
            }
            Edit::Erase(pos) => {
                map.store_mut().erase(*pos);
            }
            _ => {}
        }
    }
    map
}

proptest! {
    /// undo(apply(A)) restores the previous state; redo restores the next.
    #[test]
    fn undo_and_redo_are_inverse(
        seed in prop::collection::vec(edit_strategy(), 0..20),
        action in action_strategy(),
    ) {
        let mut map = seeded_map(&seed);
        let before = map.snapshot();
        map.apply(action).unwrap();
        let after = map.snapshot();

        prop_assert!(map.undo().unwrap());
        prop_assert_eq!(map.data(), &before);
        prop_assert!(map.redo().unwrap());
        prop_assert_eq!(map.data(), &after);
    }

    /// A batch of N actions undoes in one step, whatever positions repeat.
    #[test]
    fn batches_undo_atomically(
        seed in prop::collection::vec(edit_strategy(), 0..20),
        actions in prop::collection::vec(action_strategy(), 1..6),
    ) {
        let mut map = seeded_map(&seed);
        let before = map.snapshot();
        map.begin_batch(ActionKind::PasteTiles).unwrap();
        for action in actions {
            map.apply(action).unwrap();
        }
        map.commit_batch().unwrap();
        let after = map.snapshot();

        prop_assert!(map.history().len() <= 1);
        if map.history().len() == 1 {
            prop_assert!(map.undo().unwrap());
            prop_assert_eq!(map.data(), &before);
            prop_assert!(map.redo().unwrap());
        }
        prop_assert_eq!(map.data(), &after);
    }

    /// A sequence of actions fully undone returns to the start.
    #[test]
    fn undoing_everything_restores_the_start(
        actions in prop::collection::vec(action_strategy(), 1..10),
    ) {
        let mut map = seeded_map(&[]);
        let start = map.snapshot();
        for action in actions {
            map.apply(action).unwrap();
        }
        while map.undo().unwrap() {}
        prop_assert_eq!(map.data(), &start);
    }
}

#[test]
fn creature_and_clear_items_batch_undoes_in_one_call() {
    let pos = Position::new(5, 5, 0);
    let original = Tile::with_ground(406)
        .stacked(Item::new(1987))
        .stacked(Item::with_count(2148, 50));
    let mut map = Map::new(256, 256);
    map.data_mut().store.set(pos, original.clone()).unwrap();

    map.begin_batch(ActionKind::ChangeProperties).unwrap();
    let mut occupied = map.store().get(pos).cloned().unwrap();
    occupied.creature = Some(Creature::new("Troll"));
    map.apply(Action::new(ActionKind::Draw).set_tile(pos, occupied))
        .unwrap();
    let mut cleared = map.store().get(pos).cloned().unwrap();
    cleared.items.clear();
    map.apply(Action::new(ActionKind::DeleteTiles).set_tile(pos, cleared))
        .unwrap();
    map.commit_batch().unwrap();

    let edited = map.store().get(pos).unwrap();
    assert!(edited.creature.is_some());
    assert!(edited.items.is_empty());

    assert!(map.undo().unwrap());
    assert_eq!(map.store().get(pos), Some(&original));
    assert!(!map.undo().unwrap());
}

#[test]
fn new_action_after_undo_discards_redo() {
    let mut map = Map::new(256, 256);
    for x in 0..3 {
        map.apply(
            Action::new(ActionKind::Draw).set_tile(Position::new(x, 0, 7), Tile::with_ground(1)),
        )
        .unwrap();
    }
    map.undo().unwrap();
    map.undo().unwrap();
    assert!(map.history().can_redo());

    map.apply(Action::new(ActionKind::Draw).set_tile(Position::new(9, 9, 7), Tile::with_ground(2)))
        .unwrap();
    assert!(!map.history().can_redo());
    assert!(!map.redo().unwrap());
    assert_eq!(map.history().len(), 2);
}

#[test]
fn erased_tiles_leave_no_trace() {
    let mut map = Map::new(256, 256);
    let pos = Position::new(300, 300, 7);
    map.apply(Action::new(ActionKind::Draw).set_tile(pos, Tile::with_ground(1)))
        .unwrap();
    assert_eq!(map.store().chunk_count(), 1);
    map.apply(Action::new(ActionKind::DeleteTiles).erase(pos))
        .unwrap();
    assert!(map.store().is_empty());
    assert_eq!(map.store().chunk_count(), 0);
    assert_eq!(map.store().iter().count(), 0);
    assert!(map.store().get(Position::new(1, 1, 7)).is_none());
    assert_eq!(map.store().chunk_count(), 0);
}

#[test]
fn memory_budget_keeps_newest_entries() {
    let mut map = Map::from_data(town_map()).with_history(HistoryConfig {
        max_memory_bytes: 16 * 1024,
        max_entries: 0,
        ..HistoryConfig::default()
    });
    for round in 0..200u16 {
        let pos = Position::new(90 + round % 20, 90 + round / 20 % 20, 7);
        map.apply(
            Action::new(ActionKind::Draw)
                .set_tile(pos, Tile::with_ground(1000 + round).stacked(Item::new(round))),
        )
        .unwrap();
    }
    let history = map.history();
    assert!(history.evicted() > 0);
    assert!(history.len() >= 1);
    assert!(history.memory_usage() <= 16 * 1024 || history.len() == 1);

    // What is left still undoes cleanly.
    let kept = history.len();
    for _ in 0..kept {
        assert!(map.undo().unwrap());
    }
    assert!(!map.undo().unwrap());
}

#[test]
fn house_exit_and_waypoint_moves_notify_subscribers() {
    let mut map = Map::from_data(town_map());
    let events = map.subscribe();
    let exit = Position::new(97, 95, 7);
    let temple = Position::new(101, 100, 7);
    map.apply(
        Action::new(ActionKind::Move)
            .move_house_exit(1, Some(exit))
            .move_waypoint("temple", temple),
    )
    .unwrap();
    assert_eq!(map.data().houses[&1].exit, Some(exit));
    assert_eq!(map.data().waypoints[0].position, temple);

    map.undo().unwrap();
    assert_eq!(map.data().houses[&1].exit, Some(Position::new(96, 95, 7)));
    let received: Vec<_> = events.try_iter().collect();
    assert_eq!(
        received,
        vec![
            MapEvent::HouseExitMoved { house_id: 1 },
            MapEvent::WaypointMoved {
                name: "temple".into()
            },
            MapEvent::HouseExitMoved { house_id: 1 },
            MapEvent::WaypointMoved {
                name: "temple".into()
            },
        ]
    );
}

#[test]
fn undo_is_refused_while_a_batch_is_open() {
    let mut map = Map::new(256, 256);
    map.begin_batch(ActionKind::Draw).unwrap();
    assert_eq!(map.undo(), Err(HistoryError::BatchOpen));
    map.apply(Action::new(ActionKind::Draw).set_tile(Position::new(1, 1, 7), Tile::with_ground(1)))
        .unwrap();
    map.cancel_batch().unwrap();
    assert!(map.store().is_empty());
    assert_eq!(map.data(), &MapData::new(256, 256));
}

#[test]
fn edits_behind_the_history_make_undo_refuse() {
    let mut map = Map::new(256, 256);
    let pos = Position::new(7, 7, 7);
    map.apply(Action::new(ActionKind::Draw).set_tile(pos, Tile::with_ground(1)))
        .unwrap();
    map.store_mut().set(pos, Tile::with_ground(2)).unwrap();

    assert_eq!(map.undo(), Err(HistoryError::Inconsistent(ChangeKey::Tile(pos))));
    assert_eq!(map.store().get(pos), Some(&Tile::with_ground(2)));
    assert!(map.history().can_undo());
}
