//! Error and warning types for the store, codec and history.

use std::fmt;
use std::io;
use std::path::PathBuf;

use mapforge_core::Position;
use thiserror::Error;

use crate::history::ChangeKey;
use crate::otbm::node_name;

/// Rejected store mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Floor index above the highest supported floor.
    #[error("floor {0} is outside 0..=15")]
    FloorOutOfRange(u8),
}

/// Types of the nodes enclosing a decode failure, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePath(pub Vec<u8>);

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<file>");
        }
        for (i, kind) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(&node_name(*kind))?;
        }
        Ok(())
    }
}

/// Malformed or truncated node data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed map data at byte {offset} in {path}: {reason}")]
pub struct FormatError {
    /// Offset of the start marker of the failing node (or of the bad byte
    /// for framing errors).
    pub offset: usize,
    /// Nodes enclosing the failure.
    pub path: NodePath,
    /// What was wrong.
    pub reason: String,
}

impl FormatError {
    pub(crate) fn new(offset: usize, path: NodePath, reason: impl Into<String>) -> Self {
        Self {
            offset,
            path,
            reason: reason.into(),
        }
    }
}

/// The file is not an OTBM file this build can read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    /// The four identifier bytes are neither `OTBM` nor zero.
    #[error("unrecognised file identifier {0:02X?}")]
    BadIdentifier([u8; 4]),
    /// The OTBM version is newer than this build supports.
    #[error("unsupported OTBM version {found} (newest supported is {newest})")]
    Unsupported {
        /// Version recorded in the file.
        found: u32,
        /// Newest version this build reads.
        newest: u32,
    },
}

/// Failure to load or save a map.
#[derive(Debug, Error)]
pub enum MapError {
    /// Malformed node tree.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// Unknown identifier or future version.
    #[error(transparent)]
    Version(#[from] VersionError),
    /// Filesystem failure; never retried.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// The map holds data the format cannot represent.
    #[error("cannot encode map: {0}")]
    Encode(String),
    /// A background load or save was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl MapError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MapError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Non-fatal problem found while loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A malformed tile area was skipped in best-effort mode.
    SkippedArea {
        /// Offset of the area's start marker.
        offset: usize,
        /// Why the area was rejected.
        reason: String,
    },
    /// A tile area lies outside the declared map size.
    OutOfBoundsArea {
        /// Base position of the area.
        base: Position,
    },
    /// A position appeared twice; the later tile was kept.
    DuplicateTile {
        /// Repeated position.
        position: Position,
    },
    /// Two spawns share a center; the later one was kept.
    DuplicateSpawn {
        /// Repeated center.
        center: Position,
    },
    /// Two houses share an id; the later one was kept.
    DuplicateHouse {
        /// Repeated house id.
        house_id: u32,
    },
    /// A spawn center is out of bounds or has no tile.
    DanglingSpawn {
        /// Center of the spawn.
        center: Position,
    },
    /// Tiles reference a house that does not exist.
    DanglingHouse {
        /// Missing house id.
        house_id: u32,
        /// First tile found referencing it.
        position: Position,
    },
    /// A companion file named by the header could not be found.
    MissingCompanion {
        /// Resolved path.
        path: PathBuf,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::SkippedArea { offset, reason } => {
                write!(f, "skipped tile area at byte {offset}: {reason}")
            }
            Warning::OutOfBoundsArea { base } => {
                write!(f, "tile area at {base} lies outside the map")
            }
            Warning::DuplicateTile { position } => {
                write!(f, "tile {position} appears more than once")
            }
            Warning::DuplicateSpawn { center } => {
                write!(f, "more than one spawn is centered on {center}")
            }
            Warning::DuplicateHouse { house_id } => {
                write!(f, "house {house_id} is defined more than once")
            }
            Warning::DanglingSpawn { center } => {
                write!(f, "spawn centered on {center} has no tile inside the map")
            }
            Warning::DanglingHouse { house_id, position } => {
                write!(f, "tile {position} references unknown house {house_id}")
            }
            Warning::MissingCompanion { path } => {
                write!(f, "companion file {} not found", path.display())
            }
        }
    }
}

/// Failure of a history operation. Nothing was changed when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    /// `begin_batch` while a batch is already open.
    #[error("a batch is already open")]
    BatchAlreadyOpen,
    /// `commit_batch` or `cancel_batch` without an open batch.
    #[error("no batch is open")]
    NoOpenBatch,
    /// Undo or redo while a batch is open.
    #[error("operation not allowed while a batch is open")]
    BatchOpen,
    /// The live state no longer matches the recorded snapshot.
    #[error("history is inconsistent with the map at {0}")]
    Inconsistent(ChangeKey),
    /// The store rejected an edit.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// An edit names a house that does not exist.
    #[error("unknown house {0}")]
    UnknownHouse(u32),
    /// An edit names a waypoint that does not exist.
    #[error("unknown waypoint {0:?}")]
    UnknownWaypoint(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::otbm::node;

    #[test]
    fn node_path_names_known_types() {
        let path = NodePath(vec![node::ROOT, node::MAP_DATA, node::TILE_AREA, 200]);
        assert_eq!(path.to_string(), "ROOT/MAP_DATA/TILE_AREA/NODE_200");
        assert_eq!(NodePath::default().to_string(), "<file>");
    }

    #[test]
    fn format_error_message_carries_offset_and_path() {
        let err = FormatError::new(42, NodePath(vec![node::ROOT]), "truncated");
        assert_eq!(
            err.to_string(),
            "malformed map data at byte 42 in ROOT: truncated"
        );
    }

    #[test]
    fn warnings_display() {
        let warning = Warning::DanglingHouse {
            house_id: 7,
            position: Position::new(1, 2, 7),
        };
        assert_eq!(warning.to_string(), "tile (1, 2, 7) references unknown house 7");
    }
}
