//! Seeded random maps for property style tests.

use mapforge_core::{
    attr, AttributeValue, Creature, Direction, House, Item, Position, Spawn, Tile, TileFlags,
    Town, Waypoint,
};
use mapforge_world::{MapData, SectionFlags};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Shape of a generated map.
#[derive(Debug, Clone, Copy)]
pub struct RandomMapSpec {
    /// Map width and height.
    pub size: u16,
    /// Tiles to place (positions may repeat; the last one wins).
    pub tiles: usize,
    /// Deepest container chain generated.
    pub max_depth: usize,
    /// Floors tiles are spread over, starting at the surface.
    pub floors: u8,
}

impl Default for RandomMapSpec {
    fn default() -> Self {
        Self {
            size: 1024,
            tiles: 500,
            max_depth: 4,
            floors: 3,
        }
    }
}

/// Generate a map that survives an encode/decode round trip unchanged.
///
/// Grounds are always plain, house exits never sit at the origin and every
/// section flag that would be set by decoding is set up front.
pub fn random_map(seed: u64, spec: RandomMapSpec) -> MapData {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut map = MapData::new(spec.size, spec.size);
    map.header.sections |= SectionFlags::SPAWNS | SectionFlags::HOUSES;
    let size = map.header.width;

    let house_count = rng.gen_range(1..=4u32);
    for id in 1..=house_count {
        let mut house = House::new(id, format!("House {id}"));
        house.town_id = 1;
        house.rent = rng.gen_range(0..10_000);
        house.guildhall = rng.gen_bool(0.2);
        if rng.gen_bool(0.7) {
            house.exit = Some(Position::new(rng.gen_range(1..size), rng.gen_range(1..size), 7));
        }
        map.houses.insert(id, house);
    }

    let mut placed = Vec::with_capacity(spec.tiles);
    for _ in 0..spec.tiles {
        let pos = Position::new(
            rng.gen_range(0..size),
            rng.gen_range(0..size),
            7 + rng.gen_range(0..spec.floors.max(1)),
        );
        let tile = random_tile(&mut rng, spec.max_depth, house_count);
        map.store.set(pos, tile).expect("generated floors are valid");
        placed.push(pos);
    }

    for pos in placed.iter().step_by(50) {
        let spawn = Spawn::new(*pos, rng.gen_range(1..6)).with_entry("Rat", rng.gen_range(1..5));
        map.spawns.insert(*pos, spawn);
    }
    if let Some(first) = placed.first() {
        map.towns.push(Town {
            id: 1,
            name: "Generated".into(),
            temple: *first,
        });
        map.waypoints.push(Waypoint {
            name: "start".into(),
            position: *first,
        });
    }
    map
}

fn random_tile(rng: &mut StdRng, max_depth: usize, house_count: u32) -> Tile {
    let mut tile = Tile::with_ground(rng.gen_range(100..5000));
    for _ in 0..rng.gen_range(0..4) {
        tile.items.push(random_item(rng, max_depth));
    }
    if rng.gen_bool(0.05) {
        let mut creature = Creature::new("Rat");
        creature.spawn_time = rng.gen_range(10..600);
        creature.direction = Direction::from_u8(rng.gen_range(0..4)).unwrap_or(Direction::South);
        tile.creature = Some(creature);
    }
    if rng.gen_bool(0.1) {
        tile.house_id = Some(rng.gen_range(1..=house_count));
    }
    if rng.gen_bool(0.1) {
        tile.flags = TileFlags::from_bits_retain(rng.gen_range(0..0x40));
    }
    tile
}

fn random_item(rng: &mut StdRng, max_depth: usize) -> Item {
    let mut item = Item::new(rng.gen_range(100..5000));
    match rng.gen_range(0..6) {
        0 => item.set_count(rng.gen_range(1..=100)),
        1 => item.set_attribute(attr::ACTION_ID, AttributeValue::U16(rng.gen())),
        2 => item.set_attribute(attr::TEXT, AttributeValue::Str("note".into())),
        _ => {}
    }
    if max_depth > 1 && rng.gen_bool(0.2) {
        for _ in 0..rng.gen_range(1..3) {
            item.contents.push(random_item(rng, max_depth - 1));
        }
    }
    item
}
