use std::collections::BTreeMap;
use std::ops::ControlFlow;

use mapforge_core::{House, Item, Position, Spawn, Tile, MAX_CONTAINER_DEPTH};
use tracing::debug;

use super::attributes::write_attributes;
use super::decode::check_version;
use super::node::{self, NodeWriter};
use super::remap::ItemIdMap;
use super::{
    EncodeOptions, Observer, Progress, ATTR_DESCRIPTION, ATTR_EXT_HOUSE_FILE,
    ATTR_EXT_SPAWN_FILE, ATTR_GROUND, ATTR_TILE_FLAGS, IDENTIFIER,
};
use crate::chunk::Chunk;
use crate::error::MapError;
use crate::map::{MapData, SectionFlags};

/// Encode a map to OTBM bytes.
pub fn encode_map(map: &MapData, options: &EncodeOptions) -> Result<Vec<u8>, MapError> {
    encode_map_observed(map, options, &mut |_| ControlFlow::Continue(()))
}

/// [`encode_map`] reporting progress after every tile area. The observer
/// returning `Break` aborts with [`MapError::Cancelled`].
pub fn encode_map_observed(
    map: &MapData,
    options: &EncodeOptions,
    observer: &mut Observer<'_>,
) -> Result<Vec<u8>, MapError> {
    let header = &map.header;
    let version = options.target_version.unwrap_or(header.version);
    check_version(version)?;
    let table = options.remap.table(version);

    let mut writer = NodeWriter::new();
    writer.raw(&header.identifier);
    writer.start(node::ROOT);
    writer.u32(version);
    writer.u16(header.width);
    writer.u16(header.height);
    writer.u32(header.items_major);
    writer.u32(header.items_minor);
    writer.bytes(&header.root_reserved);

    writer.start(node::MAP_DATA);
    for description in &header.descriptions {
        writer.u8(ATTR_DESCRIPTION);
        writer.string(description)?;
    }
    if let Some(path) = &header.spawn_file {
        writer.u8(ATTR_EXT_SPAWN_FILE);
        writer.string(path)?;
    }
    if let Some(path) = &header.house_file {
        writer.u8(ATTR_EXT_HOUSE_FILE);
        writer.string(path)?;
    }
    writer.bytes(&header.data_reserved);

    let total = map.store.chunk_count();
    for (index, chunk) in map.store.chunks().enumerate() {
        write_area(&mut writer, chunk, table)?;
        let progress = Progress::Writing {
            areas: index + 1,
            total,
        };
        if observer(progress).is_break() {
            return Err(MapError::Cancelled);
        }
    }

    if header.sections.contains(SectionFlags::TOWNS) || !map.towns.is_empty() {
        writer.start(node::TOWNS);
        for town in &map.towns {
            writer.start(node::TOWN);
            writer.u32(town.id);
            writer.string(&town.name)?;
            writer.position_value(town.temple);
            writer.end();
        }
        writer.end();
    }
    if header.sections.contains(SectionFlags::WAYPOINTS) || !map.waypoints.is_empty() {
        writer.start(node::WAYPOINTS);
        for waypoint in &map.waypoints {
            writer.start(node::WAYPOINT);
            writer.string(&waypoint.name)?;
            writer.position_value(waypoint.position);
            writer.end();
        }
        writer.end();
    }
    if header.spawn_file.is_none()
        && (header.sections.contains(SectionFlags::SPAWNS) || !map.spawns.is_empty())
    {
        write_spawns(&mut writer, &map.spawns)?;
    }
    if header.house_file.is_none()
        && (header.sections.contains(SectionFlags::HOUSES) || !map.houses.is_empty())
    {
        write_houses(&mut writer, &map.houses)?;
    }

    writer.end();
    writer.end();
    debug!(bytes = writer.len(), areas = total, version, "encoded map");
    Ok(writer.finish())
}

/// Encode a companion spawn file.
pub fn encode_spawns(spawns: &BTreeMap<Position, Spawn>) -> Result<Vec<u8>, MapError> {
    let mut writer = NodeWriter::new();
    writer.raw(&IDENTIFIER);
    write_spawns(&mut writer, spawns)?;
    Ok(writer.finish())
}

/// Encode a companion house file.
pub fn encode_houses(houses: &BTreeMap<u32, House>) -> Result<Vec<u8>, MapError> {
    let mut writer = NodeWriter::new();
    writer.raw(&IDENTIFIER);
    write_houses(&mut writer, houses)?;
    Ok(writer.finish())
}

fn write_spawns(
    writer: &mut NodeWriter,
    spawns: &BTreeMap<Position, Spawn>,
) -> Result<(), MapError> {
    writer.start(node::SPAWNS);
    for spawn in spawns.values() {
        writer.start(node::SPAWN_AREA);
        writer.position_value(spawn.center);
        writer.u16(spawn.radius);
        writer.u32(spawn.interval);
        for entry in &spawn.entries {
            writer.start(node::MONSTER);
            writer.string(&entry.name)?;
            writer.u16(entry.weight);
            writer.end();
        }
        writer.end();
    }
    writer.end();
    Ok(())
}

fn write_houses(writer: &mut NodeWriter, houses: &BTreeMap<u32, House>) -> Result<(), MapError> {
    writer.start(node::HOUSES);
    for house in houses.values() {
        writer.start(node::HOUSE);
        writer.u32(house.id);
        writer.string(&house.name)?;
        writer.u32(house.town_id);
        writer.u32(house.rent);
        writer.u8(u8::from(house.guildhall));
        writer.position_value(house.exit.unwrap_or_default());
        writer.end();
    }
    writer.end();
    Ok(())
}

fn write_area(
    writer: &mut NodeWriter,
    chunk: &Chunk,
    table: Option<&ItemIdMap>,
) -> Result<(), MapError> {
    let base = chunk.position().base();
    writer.start(node::TILE_AREA);
    writer.u16(base.x);
    writer.u16(base.y);
    writer.u8(base.z);
    writer.bytes(chunk.reserved());
    for (x, y, tile) in chunk.tiles() {
        write_tile(writer, x, y, tile, table)?;
    }
    writer.end();
    Ok(())
}

fn write_tile(
    writer: &mut NodeWriter,
    x: u8,
    y: u8,
    tile: &Tile,
    table: Option<&ItemIdMap>,
) -> Result<(), MapError> {
    match tile.house_id {
        Some(house_id) => {
            writer.start(node::HOUSETILE);
            writer.u8(x);
            writer.u8(y);
            writer.u32(house_id);
        }
        None => {
            writer.start(node::TILE);
            writer.u8(x);
            writer.u8(y);
        }
    }
    if !tile.flags.is_empty() {
        writer.u8(ATTR_TILE_FLAGS);
        writer.u32(tile.flags.bits());
    }
    // A ground with attributes or contents cannot be inlined; it becomes the
    // first item child.
    let inline_ground = tile.ground.as_ref().filter(|ground| ground.is_plain());
    if let Some(ground) = inline_ground {
        writer.u8(ATTR_GROUND);
        writer.u16(disk_id(table, ground.id));
    }
    writer.bytes(&tile.reserved);

    if inline_ground.is_none() {
        if let Some(ground) = &tile.ground {
            write_item(writer, ground, table)?;
        }
    }
    for item in &tile.items {
        write_item(writer, item, table)?;
    }
    if let Some(creature) = &tile.creature {
        writer.start(node::MONSTER);
        writer.string(&creature.name)?;
        writer.u32(creature.spawn_time);
        writer.u8(creature.direction.as_u8());
        writer.end();
    }
    writer.end();
    Ok(())
}

#[inline]
fn disk_id(table: Option<&ItemIdMap>, id: u16) -> u16 {
    table.map_or(id, |table| table.to_disk(id))
}

/// Write an item tree without recursion.
fn write_item(
    writer: &mut NodeWriter,
    item: &Item,
    table: Option<&ItemIdMap>,
) -> Result<(), MapError> {
    enum Step<'a> {
        Open(&'a Item, usize),
        Close,
    }

    let mut stack = vec![Step::Open(item, 1)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Open(item, depth) => {
                if depth > MAX_CONTAINER_DEPTH {
                    return Err(MapError::Encode(format!(
                        "container nesting exceeds {MAX_CONTAINER_DEPTH}"
                    )));
                }
                writer.start(node::ITEM);
                writer.u16(disk_id(table, item.id));
                write_attributes(writer, &item.attributes)?;
                stack.push(Step::Close);
                stack.extend(
                    item.contents
                        .iter()
                        .rev()
                        .map(|child| Step::Open(child, depth + 1)),
                );
            }
            Step::Close => writer.end(),
        }
    }
    Ok(())
}
