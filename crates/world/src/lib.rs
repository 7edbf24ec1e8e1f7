//! Tile storage, OTBM codec and undo history for a tile-map editor.

mod chunk;
mod error;
mod events;
pub mod history;
mod map;
pub mod otbm;
mod persist;
mod selection;
mod storage;
pub mod task;

pub use chunk::*;
pub use error::*;
pub use events::*;
pub use history::{Action, ActionHistory, ActionKind, ChangeKey, Edit, HistoryConfig};
pub use map::*;
pub use persist::*;
pub use selection::*;
pub use storage::*;
pub use task::{LoadTask, SaveTask, TaskControl};
