//! Hand-built maps and items.

use mapforge_core::{
    attr, AttributeValue, Creature, House, Item, Position, Spawn, Tile, TileFlags, Town, Waypoint,
};
use mapforge_world::{MapData, SectionFlags};

/// Position used by the single-tile scenarios.
pub const SCENARIO_POS: Position = Position::new(100, 100, 7);

/// Ground id used by the single-tile scenarios.
pub const SCENARIO_GROUND: u16 = 4526;

/// 256x256 map holding one tile at [`SCENARIO_POS`] with a plain ground.
pub fn single_tile_map() -> MapData {
    let mut map = MapData::new(256, 256);
    map.store
        .set(SCENARIO_POS, Tile::with_ground(SCENARIO_GROUND))
        .expect("floor 7 is valid");
    map
}

/// Chain of containers `depth` items deep, innermost holding a coin stack.
pub fn nested_container(depth: usize) -> Item {
    let mut item = Item::with_count(2148, 100);
    for level in 1..depth {
        item = Item::new(1987 + (level % 3) as u16).containing(item);
    }
    item
}

/// Item carrying one attribute of every payload shape.
pub fn decorated_item() -> Item {
    let mut item = Item::new(1740);
    item.set_attribute(attr::ACTION_ID, AttributeValue::U16(1000));
    item.set_attribute(attr::UNIQUE_ID, AttributeValue::U16(5000));
    item.set_attribute(attr::TEXT, AttributeValue::Str("Welcome to Thais".into()));
    item.set_attribute(attr::TELE_DEST, AttributeValue::Position(Position::new(32, 64, 6)));
    item.set_attribute(attr::DURATION, AttributeValue::U32(3600));
    item.set_attribute(attr::HOUSE_DOOR_ID, AttributeValue::U8(2));
    item
}

/// Small map using every section: towns, waypoints, inline spawns and
/// houses, house tiles, a creature, zone flags and containers.
pub fn town_map() -> MapData {
    let mut map = MapData::new(512, 512);
    map.header.descriptions.push("Saved by the test kit".into());
    map.header.sections |= SectionFlags::SPAWNS | SectionFlags::HOUSES;

    for x in 90..110 {
        for y in 90..110 {
            map.store
                .set(Position::new(x, y, 7), Tile::with_ground(4526 + (x % 4)))
                .expect("floor 7 is valid");
        }
    }

    let temple = Position::new(100, 100, 7);
    let mut temple_tile = Tile::with_ground(1234).stacked(decorated_item());
    temple_tile.flags = TileFlags::PROTECTION_ZONE;
    map.store.set(temple, temple_tile).expect("floor 7 is valid");

    let shop = Position::new(95, 95, 7);
    let shop_tile = Tile {
        house_id: Some(1),
        ..Tile::with_ground(405).stacked(nested_container(3))
    };
    map.store.set(shop, shop_tile).expect("floor 7 is valid");

    let lair = Position::new(105, 92, 7);
    let mut lair_tile = Tile::with_ground(4526);
    lair_tile.creature = Some(Creature::new("Rat"));
    map.store.set(lair, lair_tile).expect("floor 7 is valid");

    map.towns.push(Town {
        id: 1,
        name: "Thais".into(),
        temple,
    });
    map.waypoints.push(Waypoint {
        name: "temple".into(),
        position: temple,
    });
    map.spawns
        .insert(lair, Spawn::new(lair, 3).with_entry("Rat", 2).with_entry("Cave Rat", 1));
    let mut house = House::new(1, "Market Street 1");
    house.town_id = 1;
    house.rent = 500;
    house.exit = Some(Position::new(96, 95, 7));
    map.houses.insert(house.id, house);
    map
}
