//! Load and save on a worker thread.
//!
//! A task reports [`Progress`] once per tile area and checks its
//! [`TaskControl`] at the same points, so cancellation takes effect at the
//! next area boundary. A cancelled load discards everything it decoded.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::otbm::{DecodeOptions, Decoded, Progress};
use crate::persist::{read_map_file, write_map_file, SaveOptions};
use crate::{MapData, MapError};

/// Cooperative cancel flag shared between a task and its owner.
#[derive(Debug, Clone, Default)]
pub struct TaskControl {
    cancelled: Arc<AtomicBool>,
}

impl TaskControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// A running background load or save.
#[derive(Debug)]
pub struct Task<T> {
    path: PathBuf,
    control: TaskControl,
    progress: Receiver<Progress>,
    handle: JoinHandle<Result<T, MapError>>,
}

pub type LoadTask = Task<Decoded>;
pub type SaveTask = Task<()>;

impl<T: Send + 'static> Task<T> {
    fn spawn<F>(name: &str, path: PathBuf, control: TaskControl, work: F) -> Result<Self, MapError>
    where
        F: FnOnce(&Path, &mut dyn FnMut(Progress) -> ControlFlow<()>) -> Result<T, MapError>
            + Send
            + 'static,
    {
        let (tx, progress) = mpsc::channel();
        let worker_control = control.clone();
        let worker_path = path.clone();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let mut observer = |step: Progress| {
                    // The owner may have stopped listening; progress is advisory.
                    let _ = tx.send(step);
                    if worker_control.is_cancelled() {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                };
                let result = work(&worker_path, &mut observer);
                if matches!(result, Err(MapError::Cancelled)) {
                    debug!(path = %worker_path.display(), "background task cancelled");
                }
                result
            })
            .map_err(|err| MapError::io(&path, err))?;
        Ok(Self {
            path,
            control,
            progress,
            handle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cancel(&self) {
        self.control.cancel();
    }

    /// Progress reported since the last call, without blocking.
    pub fn progress(&self) -> impl Iterator<Item = Progress> + '_ {
        self.progress.try_iter()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the worker is done. A worker panic is propagated.
    pub fn wait(self) -> Result<T, MapError> {
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Task<Decoded> {
    /// Decode `path` (and its companions) on a worker thread. Hand the
    /// result to `Map::replace_with`.
    pub fn load(
        path: impl Into<PathBuf>,
        options: DecodeOptions,
        control: TaskControl,
    ) -> Result<Self, MapError> {
        Self::spawn("mapforge-load", path.into(), control, move |path, observer| {
            read_map_file(path, &options, observer)
        })
    }
}

impl Task<()> {
    /// Encode a frozen snapshot and write it on a worker thread.
    pub fn save(
        path: impl Into<PathBuf>,
        data: MapData,
        options: SaveOptions,
        control: TaskControl,
    ) -> Result<Self, MapError> {
        Self::spawn("mapforge-save", path.into(), control, move |path, observer| {
            write_map_file(path, &data, &options, observer)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{Action, ActionKind};
    use crate::Map;
    use mapforge_core::{Position, Tile};

    fn spread_map() -> Map {
        let mut map = Map::new(2048, 2048);
        let mut action = Action::new(ActionKind::Draw);
        for i in 0..6u16 {
            action = action.set_tile(Position::new(i * 300, i * 300, 7), Tile::with_ground(100 + i));
        }
        map.apply(action).unwrap();
        map
    }

    #[test]
    fn save_then_load_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bg.otbm");
        let map = spread_map();

        let save = SaveTask::save(&path, map.snapshot(), SaveOptions::default(), TaskControl::new())
            .unwrap();
        save.wait().unwrap();

        let load = LoadTask::load(&path, DecodeOptions::default(), TaskControl::new()).unwrap();
        let decoded = load.wait().unwrap();
        assert_eq!(&decoded.map, map.data());

        let mut reopened = Map::default();
        let rx = reopened.subscribe();
        reopened.replace_with(decoded, Some(path));
        assert_eq!(reopened.store().len(), 6);
        assert_eq!(rx.try_recv(), Ok(crate::MapEvent::MapReloaded));
    }

    #[test]
    fn load_reports_progress_per_area() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.otbm");
        spread_map().save(&path).unwrap();

        let load = LoadTask::load(&path, DecodeOptions::default(), TaskControl::new()).unwrap();
        while !load.is_finished() {
            thread::yield_now();
        }
        let steps: Vec<_> = load.progress().collect();
        assert_eq!(steps.len(), 6);
        assert!(matches!(steps.last(), Some(Progress::Reading { offset, total }) if offset <= total));
        load.wait().unwrap();
    }

    #[test]
    fn cancelled_load_discards_result() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cancel.otbm");
        spread_map().save(&path).unwrap();

        let control = TaskControl::new();
        control.cancel();
        let load = LoadTask::load(&path, DecodeOptions::default(), control).unwrap();
        assert!(matches!(load.wait(), Err(MapError::Cancelled)));
    }

    #[test]
    fn cancelled_save_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.otbm");
        let control = TaskControl::new();
        control.cancel();
        let save = SaveTask::save(&path, spread_map().snapshot(), SaveOptions::default(), control)
            .unwrap();
        assert!(matches!(save.wait(), Err(MapError::Cancelled)));
        assert!(!path.exists());
    }
}
