use std::collections::BTreeMap;
use std::ops::ControlFlow;

use mapforge_core::{
    Creature, Direction, House, Item, Position, Spawn, SpawnEntry, Tile, TileFlags, Town,
    Waypoint, MAX_CONTAINER_DEPTH, MAX_FLOOR,
};
use tracing::debug;

use super::attributes::read_attributes;
use super::node::{self, NodeCursor, NodeEvent};
use super::props::{PayloadError, PayloadResult, PropReader};
use super::remap::ItemIdMap;
use super::{
    check_house_references, check_spawn_references, DecodeOptions, Decoded, Observer, Progress,
    Recovery, ATTR_DESCRIPTION, ATTR_EXT_HOUSE_FILE, ATTR_EXT_SPAWN_FILE, ATTR_GROUND,
    ATTR_TILE_FLAGS, IDENTIFIER, IDENTIFIER_ZERO, NEWEST_VERSION,
};
use crate::error::{FormatError, MapError, VersionError, Warning};
use crate::map::{MapData, MapHeader, SectionFlags};
use crate::ChunkPos;

/// Open node being assembled.
enum Frame {
    Root,
    MapData,
    Area {
        offset: usize,
        depth: usize,
        base: Position,
        reserved: Vec<u8>,
        tiles: Vec<(Position, Tile)>,
    },
    Tile {
        position: Position,
        tile: Tile,
    },
    Item(Item),
    Creature(Creature),
    Towns,
    Town(Town),
    Waypoints,
    Waypoint(Waypoint),
    Spawns,
    SpawnArea(Spawn),
    SpawnMonster(SpawnEntry),
    Houses,
    House(House),
}

/// Copyable view of the innermost open frame.
#[derive(Clone, Copy)]
enum Parent {
    Root,
    MapData,
    Area(Position),
    Tile,
    Item,
    Towns,
    Waypoints,
    Spawns,
    SpawnArea,
    Houses,
    Leaf,
}

struct Decoder<'o> {
    options: &'o DecodeOptions,
    root_kind: u8,
    data: MapData,
    warnings: Vec<Warning>,
    frames: Vec<Frame>,
    item_depth: usize,
    table: Option<ItemIdMap>,
    saw_root: bool,
    saw_map_data: bool,
}

fn check_identifier(data: &[u8]) -> Result<[u8; 4], MapError> {
    let Some(head) = data.get(..4) else {
        return Err(FormatError::new(
            data.len(),
            Default::default(),
            "file shorter than its identifier",
        )
        .into());
    };
    let identifier = [head[0], head[1], head[2], head[3]];
    if identifier != IDENTIFIER && identifier != IDENTIFIER_ZERO {
        return Err(VersionError::BadIdentifier(identifier).into());
    }
    Ok(identifier)
}

/// Decode a complete map file (identifier + ROOT node).
pub fn decode_map(data: &[u8], options: &DecodeOptions) -> Result<Decoded, MapError> {
    decode_map_observed(data, options, &mut |_| ControlFlow::Continue(()))
}

/// [`decode_map`] reporting progress after every tile area. The observer
/// returning `Break` aborts with [`MapError::Cancelled`].
pub fn decode_map_observed(
    data: &[u8],
    options: &DecodeOptions,
    observer: &mut Observer<'_>,
) -> Result<Decoded, MapError> {
    let identifier = check_identifier(data)?;
    let mut decoder = Decoder::new(options, node::ROOT);
    decoder.data.header.identifier = identifier;
    decoder.run(data, observer)?;

    if !decoder.saw_map_data {
        return Err(FormatError::new(4, Default::default(), "map has no MAP_DATA node").into());
    }

    let mut map = decoder.data;
    let mut warnings = decoder.warnings;
    if map.header.spawn_file.is_none() {
        warnings.extend(check_spawn_references(&map));
    }
    if map.header.house_file.is_none() {
        warnings.extend(check_house_references(&map));
    }
    map.store.take_dirty();
    debug!(
        tiles = map.store.len(),
        chunks = map.store.chunk_count(),
        warnings = warnings.len(),
        "decoded map"
    );
    Ok(Decoded { map, warnings })
}

/// Decode a companion spawn file (identifier + SPAWNS node), along with any
/// repeated centers found in it.
pub fn decode_spawns(
    data: &[u8],
) -> Result<(BTreeMap<Position, Spawn>, Vec<Warning>), MapError> {
    check_identifier(data)?;
    let options = DecodeOptions::default();
    let mut decoder = Decoder::new(&options, node::SPAWNS);
    decoder.run(data, &mut |_| ControlFlow::Continue(()))?;
    Ok((decoder.data.spawns, decoder.warnings))
}

/// Decode a companion house file (identifier + HOUSES node), along with any
/// repeated house ids found in it.
pub fn decode_houses(data: &[u8]) -> Result<(BTreeMap<u32, House>, Vec<Warning>), MapError> {
    check_identifier(data)?;
    let options = DecodeOptions::default();
    let mut decoder = Decoder::new(&options, node::HOUSES);
    decoder.run(data, &mut |_| ControlFlow::Continue(()))?;
    Ok((decoder.data.houses, decoder.warnings))
}

impl<'o> Decoder<'o> {
    fn new(options: &'o DecodeOptions, root_kind: u8) -> Self {
        Self {
            options,
            root_kind,
            data: MapData::default(),
            warnings: Vec::new(),
            frames: Vec::new(),
            item_depth: 0,
            table: None,
            saw_root: false,
            saw_map_data: false,
        }
    }

    fn run(&mut self, data: &[u8], observer: &mut Observer<'_>) -> Result<(), MapError> {
        let mut cursor = NodeCursor::new(data, 4);
        while let Some(event) = cursor.next_event()? {
            let (result, starting_area) = match event {
                NodeEvent::Start {
                    kind,
                    offset,
                    payload,
                } => {
                    if self.frames.is_empty() && kind == node::ROOT {
                        if let Some(version) = payload.get(..4) {
                            check_version(u32::from_le_bytes([
                                version[0], version[1], version[2], version[3],
                            ]))?;
                        }
                    }
                    let result = self
                        .open(kind, offset, &payload, cursor.depth())
                        .map_err(|err| MapError::from(FormatError::new(offset, cursor.path(), err.0)));
                    (result, kind == node::TILE_AREA)
                }
                NodeEvent::End => (self.close(&cursor, observer), false),
            };

            let err = match result {
                Ok(()) => continue,
                Err(err) => err,
            };
            if matches!(err, MapError::Cancelled) || self.options.recovery == Recovery::Strict {
                return Err(err);
            }
            let MapError::Format(format) = err else {
                return Err(err);
            };
            self.skip_area(&mut cursor, format, starting_area, observer)?;
        }
        if !self.saw_root {
            return Err(FormatError::new(4, Default::default(), "missing root node").into());
        }
        Ok(())
    }

    /// Best-effort recovery: drop the tile area enclosing the failure.
    fn skip_area(
        &mut self,
        cursor: &mut NodeCursor<'_>,
        err: FormatError,
        starting_area: bool,
        observer: &mut Observer<'_>,
    ) -> Result<(), MapError> {
        let enclosing = self.frames.iter().rposition(|frame| matches!(frame, Frame::Area { .. }));
        let (depth, offset) = match (enclosing, starting_area) {
            (Some(index), _) => match &self.frames[index] {
                Frame::Area { depth, offset, .. } => (*depth, *offset),
                _ => unreachable!("rposition matched an area"),
            },
            (None, true) => (cursor.depth(), err.offset),
            (None, false) => return Err(err.into()),
        };

        cursor.skip_to_close(depth)?;
        if let Some(index) = enclosing {
            self.frames.truncate(index);
        }
        self.item_depth = 0;
        self.warnings.push(Warning::SkippedArea {
            offset,
            reason: err.to_string(),
        });
        report(observer, cursor)
    }

    fn parent(&self) -> Option<Parent> {
        Some(match self.frames.last()? {
            Frame::Root => Parent::Root,
            Frame::MapData => Parent::MapData,
            Frame::Area { base, .. } => Parent::Area(*base),
            Frame::Tile { .. } => Parent::Tile,
            Frame::Item(_) => Parent::Item,
            Frame::Towns => Parent::Towns,
            Frame::Waypoints => Parent::Waypoints,
            Frame::Spawns => Parent::Spawns,
            Frame::SpawnArea(_) => Parent::SpawnArea,
            Frame::Houses => Parent::Houses,
            Frame::Creature(_)
            | Frame::Town(_)
            | Frame::Waypoint(_)
            | Frame::SpawnMonster(_)
            | Frame::House(_) => Parent::Leaf,
        })
    }

    fn open(&mut self, kind: u8, offset: usize, payload: &[u8], depth: usize) -> PayloadResult<()> {
        let mut reader = PropReader::new(payload);
        let frame = match (self.parent(), kind) {
            (None, kind) if kind == self.root_kind => {
                self.saw_root = true;
                match kind {
                    node::ROOT => {
                        self.read_root(&mut reader)?;
                        Frame::Root
                    }
                    node::SPAWNS => {
                        reader.expect_end("SPAWNS")?;
                        Frame::Spawns
                    }
                    _ => {
                        reader.expect_end("HOUSES")?;
                        Frame::Houses
                    }
                }
            }
            (Some(Parent::Root), node::MAP_DATA) => {
                if self.saw_map_data {
                    return Err(PayloadError("second MAP_DATA node".into()));
                }
                self.saw_map_data = true;
                read_map_data(&mut reader, &mut self.data.header)?;
                Frame::MapData
            }
            (Some(Parent::MapData), node::TILE_AREA) => {
                let x = reader.u16("area x")?;
                let y = reader.u16("area y")?;
                let z = reader.u8("area z")?;
                if z > MAX_FLOOR {
                    return Err(PayloadError(format!("area floor {z} is outside 0..=15")));
                }
                let base = Position::new(x, y, z);
                if x >= self.data.header.width || y >= self.data.header.height {
                    self.warnings.push(Warning::OutOfBoundsArea { base });
                }
                Frame::Area {
                    offset,
                    depth,
                    base,
                    reserved: reader.rest(),
                    tiles: Vec::new(),
                }
            }
            (Some(Parent::MapData), node::TOWNS) => {
                reader.expect_end("TOWNS")?;
                self.data.header.sections.insert(SectionFlags::TOWNS);
                Frame::Towns
            }
            (Some(Parent::MapData), node::WAYPOINTS) => {
                reader.expect_end("WAYPOINTS")?;
                self.data.header.sections.insert(SectionFlags::WAYPOINTS);
                Frame::Waypoints
            }
            (Some(Parent::MapData), node::SPAWNS) => {
                reader.expect_end("SPAWNS")?;
                self.data.header.sections.insert(SectionFlags::SPAWNS);
                Frame::Spawns
            }
            (Some(Parent::MapData), node::HOUSES) => {
                reader.expect_end("HOUSES")?;
                self.data.header.sections.insert(SectionFlags::HOUSES);
                Frame::Houses
            }
            (Some(Parent::Area(base)), node::TILE | node::HOUSETILE) => {
                self.read_tile(&mut reader, base, kind == node::HOUSETILE)?
            }
            (Some(Parent::Tile | Parent::Item), node::ITEM) => {
                if self.item_depth >= MAX_CONTAINER_DEPTH {
                    return Err(PayloadError(format!(
                        "container nesting exceeds {MAX_CONTAINER_DEPTH}"
                    )));
                }
                let mut item = Item::new(reader.u16("item id")?);
                if let Some(table) = &self.table {
                    item.id = table.to_editor(item.id);
                }
                item.attributes = read_attributes(&mut reader)?;
                self.item_depth += 1;
                Frame::Item(item)
            }
            (Some(Parent::Tile), node::MONSTER) => {
                let mut creature = Creature::new(reader.string("creature name")?);
                creature.spawn_time = reader.u32("creature spawn time")?;
                let direction = reader.u8("creature direction")?;
                creature.direction = Direction::from_u8(direction)
                    .ok_or_else(|| PayloadError(format!("invalid direction {direction}")))?;
                reader.expect_end("MONSTER")?;
                Frame::Creature(creature)
            }
            (Some(Parent::Towns), node::TOWN) => {
                let id = reader.u32("town id")?;
                let name = reader.string("town name")?;
                let temple = reader.position_value("town temple")?;
                reader.expect_end("TOWN")?;
                Frame::Town(Town { id, name, temple })
            }
            (Some(Parent::Waypoints), node::WAYPOINT) => {
                let name = reader.string("waypoint name")?;
                let position = reader.position_value("waypoint position")?;
                reader.expect_end("WAYPOINT")?;
                Frame::Waypoint(Waypoint { name, position })
            }
            (Some(Parent::Spawns), node::SPAWN_AREA) => {
                let center = reader.position_value("spawn center")?;
                let mut spawn = Spawn::new(center, reader.u16("spawn radius")?);
                spawn.interval = reader.u32("spawn interval")?;
                reader.expect_end("SPAWN_AREA")?;
                Frame::SpawnArea(spawn)
            }
            (Some(Parent::SpawnArea), node::MONSTER) => {
                let name = reader.string("monster name")?;
                let weight = reader.u16("monster weight")?;
                reader.expect_end("MONSTER")?;
                Frame::SpawnMonster(SpawnEntry { name, weight })
            }
            (Some(Parent::Houses), node::HOUSE) => {
                let mut house = House::new(reader.u32("house id")?, reader.string("house name")?);
                house.town_id = reader.u32("house town")?;
                house.rent = reader.u32("house rent")?;
                house.guildhall = reader.u8("house guildhall")? != 0;
                let exit = reader.position_value("house exit")?;
                house.exit = (exit != Position::default()).then_some(exit);
                reader.expect_end("HOUSE")?;
                Frame::House(house)
            }
            (_, kind) => {
                return Err(PayloadError(format!(
                    "unexpected {} node here",
                    node::node_name(kind)
                )))
            }
        };
        self.frames.push(frame);
        Ok(())
    }

    fn read_root(&mut self, reader: &mut PropReader<'_>) -> PayloadResult<()> {
        let header = &mut self.data.header;
        header.version = reader.u32("otbm version")?;
        header.width = reader.u16("map width")?;
        header.height = reader.u16("map height")?;
        header.items_major = reader.u32("items major version")?;
        header.items_minor = reader.u32("items minor version")?;
        header.root_reserved = reader.rest();
        self.table = self.options.remap.table(header.version).cloned();
        Ok(())
    }

    fn read_tile(
        &mut self,
        reader: &mut PropReader<'_>,
        base: Position,
        housed: bool,
    ) -> PayloadResult<Frame> {
        let dx = reader.u8("tile x")?;
        let dy = reader.u8("tile y")?;
        let position = base
            .offset(i32::from(dx), i32::from(dy), 0)
            .ok_or_else(|| PayloadError(format!("tile offset ({dx}, {dy}) leaves the map")))?;

        let mut tile = Tile::default();
        if housed {
            tile.house_id = Some(reader.u32("house id")?);
        }
        while !reader.is_exhausted() {
            let start = reader.position();
            match reader.u8("tile attribute")? {
                ATTR_TILE_FLAGS => {
                    tile.flags = TileFlags::from_bits_retain(reader.u32("tile flags")?);
                }
                ATTR_GROUND => {
                    let mut ground = Item::new(reader.u16("ground id")?);
                    if let Some(table) = &self.table {
                        ground.id = table.to_editor(ground.id);
                    }
                    tile.ground = Some(ground);
                }
                _ => {
                    reader.seek(start);
                    tile.reserved = reader.rest();
                }
            }
        }
        Ok(Frame::Tile { position, tile })
    }

    fn close(
        &mut self,
        cursor: &NodeCursor<'_>,
        observer: &mut Observer<'_>,
    ) -> Result<(), MapError> {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };
        if let Frame::Area {
            base,
            reserved,
            tiles,
            ..
        } = frame
        {
            self.commit_area(base, reserved, tiles);
            return report(observer, cursor);
        }
        match (frame, self.frames.last_mut()) {
            (Frame::Item(item), Some(Frame::Item(container))) => {
                self.item_depth -= 1;
                container.contents.push(item);
            }
            (Frame::Item(item), Some(Frame::Tile { tile, .. })) => {
                self.item_depth -= 1;
                tile.items.push(item);
            }
            (Frame::Creature(creature), Some(Frame::Tile { tile, position })) => {
                if tile.creature.is_some() {
                    return Err(FormatError::new(
                        cursor.offset(),
                        cursor.path(),
                        format!("tile {position} holds more than one creature"),
                    )
                    .into());
                }
                tile.creature = Some(creature);
            }
            (Frame::Tile { position, tile }, Some(Frame::Area { tiles, .. })) => {
                tiles.push((position, tile));
            }
            (Frame::Town(town), _) => self.data.towns.push(town),
            (Frame::Waypoint(waypoint), _) => self.data.waypoints.push(waypoint),
            (Frame::SpawnMonster(entry), Some(Frame::SpawnArea(spawn))) => spawn.entries.push(entry),
            (Frame::SpawnArea(spawn), _) => {
                let center = spawn.center;
                if self.data.spawns.insert(center, spawn).is_some() {
                    self.warnings.push(Warning::DuplicateSpawn { center });
                }
            }
            (Frame::House(house), _) => {
                let house_id = house.id;
                if self.data.houses.insert(house_id, house).is_some() {
                    self.warnings.push(Warning::DuplicateHouse { house_id });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn commit_area(&mut self, base: Position, reserved: Vec<u8>, tiles: Vec<(Position, Tile)>) {
        let store = &mut self.data.store;
        let chunk = store.ensure_chunk(ChunkPos::of(base));
        if !reserved.is_empty() {
            chunk.set_reserved(reserved);
        }
        for (position, tile) in tiles {
            if store.get(position).is_some() {
                self.warnings.push(Warning::DuplicateTile { position });
            }
            // Floors were validated when the area opened.
            let _ = store.set(position, tile);
        }
    }
}

fn report(observer: &mut Observer<'_>, cursor: &NodeCursor<'_>) -> Result<(), MapError> {
    let progress = Progress::Reading {
        offset: cursor.offset(),
        total: cursor.input_len(),
    };
    match observer(progress) {
        ControlFlow::Continue(()) => Ok(()),
        ControlFlow::Break(()) => Err(MapError::Cancelled),
    }
}

fn read_map_data(reader: &mut PropReader<'_>, header: &mut MapHeader) -> PayloadResult<()> {
    while !reader.is_exhausted() {
        let start = reader.position();
        match reader.u8("map attribute")? {
            ATTR_DESCRIPTION => header.descriptions.push(reader.string("description")?),
            ATTR_EXT_SPAWN_FILE => header.spawn_file = Some(reader.string("spawn file")?),
            ATTR_EXT_HOUSE_FILE => header.house_file = Some(reader.string("house file")?),
            _ => {
                reader.seek(start);
                header.data_reserved = reader.rest();
            }
        }
    }
    Ok(())
}

/// Reject versions newer than this build before any payload is trusted.
pub(crate) fn check_version(version: u32) -> Result<(), VersionError> {
    if version > NEWEST_VERSION {
        return Err(VersionError::Unsupported {
            found: version,
            newest: NEWEST_VERSION,
        });
    }
    Ok(())
}
