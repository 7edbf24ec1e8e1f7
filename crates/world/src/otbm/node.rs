//! Node tree framing.
//!
//! A node is `NODE_START`, a type byte, an escaped payload, its children and
//! `NODE_END`. Inside payloads the three marker bytes are prefixed with
//! `ESCAPE`. An escape followed by anything else is an error; the reader never
//! guesses.

use crate::error::{FormatError, NodePath};

pub const NODE_START: u8 = 0xFE;
pub const NODE_END: u8 = 0xFF;
pub const ESCAPE: u8 = 0xFD;

pub const ROOT: u8 = 0;
pub const MAP_DATA: u8 = 2;
pub const TILE_AREA: u8 = 4;
pub const TILE: u8 = 5;
pub const ITEM: u8 = 6;
pub const SPAWNS: u8 = 9;
pub const SPAWN_AREA: u8 = 10;
pub const MONSTER: u8 = 11;
pub const TOWNS: u8 = 12;
pub const TOWN: u8 = 13;
pub const HOUSETILE: u8 = 14;
pub const WAYPOINTS: u8 = 15;
pub const WAYPOINT: u8 = 16;
pub const HOUSES: u8 = 17;
pub const HOUSE: u8 = 18;

/// Deepest node nesting the reader accepts: root, map data, area, tile and a
/// full container chain, plus slack so the container check fires first.
pub const MAX_NODE_DEPTH: usize = mapforge_core::MAX_CONTAINER_DEPTH + 8;

/// Human readable node type name.
pub fn node_name(kind: u8) -> String {
    let name = match kind {
        ROOT => "ROOT",
        MAP_DATA => "MAP_DATA",
        TILE_AREA => "TILE_AREA",
        TILE => "TILE",
        ITEM => "ITEM",
        SPAWNS => "SPAWNS",
        SPAWN_AREA => "SPAWN_AREA",
        MONSTER => "MONSTER",
        TOWNS => "TOWNS",
        TOWN => "TOWN",
        HOUSETILE => "HOUSETILE",
        WAYPOINTS => "WAYPOINTS",
        WAYPOINT => "WAYPOINT",
        HOUSES => "HOUSES",
        HOUSE => "HOUSE",
        other => return format!("NODE_{other}"),
    };
    name.to_string()
}

#[inline]
fn is_marker(byte: u8) -> bool {
    matches!(byte, NODE_START | NODE_END | ESCAPE)
}

/// One step of the node stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A node opened; its payload is already unescaped.
    Start {
        kind: u8,
        offset: usize,
        payload: Vec<u8>,
    },
    /// The innermost open node closed.
    End,
}

/// Streaming reader over a node tree with an explicit depth stack.
pub struct NodeCursor<'a> {
    data: &'a [u8],
    pos: usize,
    open: Vec<(u8, usize)>,
    rooted: bool,
}

impl<'a> NodeCursor<'a> {
    /// Reader positioned at `start` (just after the file identifier).
    pub fn new(data: &'a [u8], start: usize) -> Self {
        Self {
            data,
            pos: start,
            open: Vec::new(),
            rooted: false,
        }
    }

    /// Current byte offset.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Total input length.
    pub fn input_len(&self) -> usize {
        self.data.len()
    }

    /// Number of open nodes.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Types of the open nodes, outermost first.
    pub fn path(&self) -> NodePath {
        NodePath(self.open.iter().map(|(kind, _)| *kind).collect())
    }

    fn error(&self, offset: usize, reason: impl Into<String>) -> FormatError {
        FormatError::new(offset, self.path(), reason)
    }

    /// Next event, or `None` once the root node has closed and the input is
    /// exhausted.
    pub fn next_event(&mut self) -> Result<Option<NodeEvent>, FormatError> {
        let Some(&byte) = self.data.get(self.pos) else {
            if self.open.is_empty() {
                return Ok(None);
            }
            return Err(self.error(self.pos, "unexpected end of input inside node"));
        };

        match byte {
            NODE_START => {
                if self.open.is_empty() && self.rooted {
                    return Err(self.error(self.pos, "second root node"));
                }
                if self.open.len() >= MAX_NODE_DEPTH {
                    return Err(self.error(self.pos, "node nesting too deep"));
                }
                let offset = self.pos;
                let Some(&kind) = self.data.get(self.pos + 1) else {
                    return Err(self.error(offset, "node type missing"));
                };
                self.pos += 2;
                self.open.push((kind, offset));
                self.rooted = true;
                let payload = self.read_payload()?;
                Ok(Some(NodeEvent::Start {
                    kind,
                    offset,
                    payload,
                }))
            }
            NODE_END => {
                if self.open.pop().is_none() {
                    return Err(self.error(self.pos, "end marker without open node"));
                }
                self.pos += 1;
                Ok(Some(NodeEvent::End))
            }
            _ if self.open.is_empty() => Err(self.error(self.pos, "trailing bytes after root node")),
            other => Err(self.error(self.pos, format!("unexpected byte 0x{other:02X} between nodes"))),
        }
    }

    fn read_payload(&mut self) -> Result<Vec<u8>, FormatError> {
        let mut payload = Vec::new();
        loop {
            let Some(&byte) = self.data.get(self.pos) else {
                return Err(self.error(self.pos, "unexpected end of input in payload"));
            };
            match byte {
                NODE_START | NODE_END => return Ok(payload),
                ESCAPE => {
                    match self.data.get(self.pos + 1) {
                        Some(&next) if is_marker(next) => payload.push(next),
                        Some(&next) => {
                            return Err(self.error(
                                self.pos,
                                format!("escape followed by non-marker byte 0x{next:02X}"),
                            ))
                        }
                        None => return Err(self.error(self.pos, "escape at end of input")),
                    }
                    self.pos += 2;
                }
                other => {
                    payload.push(other);
                    self.pos += 1;
                }
            }
        }
    }

    /// Skip forward until the node open at `depth` (1-based) has closed,
    /// without decoding payloads. Escapes are still validated.
    pub fn skip_to_close(&mut self, depth: usize) -> Result<(), FormatError> {
        while self.open.len() >= depth {
            let Some(&byte) = self.data.get(self.pos) else {
                return Err(self.error(self.pos, "unexpected end of input while skipping"));
            };
            match byte {
                NODE_START => {
                    let Some(&kind) = self.data.get(self.pos + 1) else {
                        return Err(self.error(self.pos, "node type missing"));
                    };
                    self.open.push((kind, self.pos));
                    self.pos += 2;
                }
                NODE_END => {
                    self.open.pop();
                    self.pos += 1;
                }
                ESCAPE => match self.data.get(self.pos + 1) {
                    Some(&next) if is_marker(next) => self.pos += 2,
                    _ => return Err(self.error(self.pos, "invalid escape while skipping")),
                },
                _ => self.pos += 1,
            }
        }
        Ok(())
    }
}

/// Writer producing framed, escaped node output.
#[derive(Debug, Default)]
pub struct NodeWriter {
    buf: Vec<u8>,
    depth: usize,
}

impl NodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write raw unframed bytes (the file identifier).
    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn start(&mut self, kind: u8) {
        self.buf.push(NODE_START);
        self.buf.push(kind);
        self.depth += 1;
    }

    pub fn end(&mut self) {
        debug_assert!(self.depth > 0, "unbalanced node end");
        self.buf.push(NODE_END);
        self.depth -= 1;
    }

    pub fn u8(&mut self, value: u8) {
        if is_marker(value) {
            self.buf.push(ESCAPE);
        }
        self.buf.push(value);
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.u8(byte);
        }
    }

    pub fn u16(&mut self, value: u16) {
        self.bytes(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        debug_assert_eq!(self.depth, 0, "unclosed nodes");
        self.buf
    }
}
