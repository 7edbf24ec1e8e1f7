use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::warn;

use mapforge_world::otbm::{DecodeOptions, Recovery};
use mapforge_world::{HistoryConfig, LoadOptions, SaveOptions};

pub const DEFAULT_CONFIG_PATH: &str = "config/mapforge.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EditorConfig {
    pub history: HistoryConfig,
    pub io: IoConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct IoConfig {
    /// `strict` aborts on the first damaged tile area, `best_effort` skips it.
    pub recovery: Recovery,
    /// Keep the previous file as `<file>~` after saving over it.
    pub keep_backup: bool,
    /// gzip level (0 to 9) used for `.otgz` output.
    pub compression_level: u32,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            recovery: Recovery::Strict,
            keep_backup: false,
            compression_level: 6,
        }
    }
}

impl EditorConfig {
    /// Load configuration from the default path.
    pub fn load() -> Self {
        Self::load_from_path(Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<EditorConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    EditorConfig::default()
                }
            },
            Err(err) => {
                if path != Path::new(DEFAULT_CONFIG_PATH)
                    || err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                }
                EditorConfig::default()
            }
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            decode: self.decode_options(),
            history: self.history.clone(),
        }
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            recovery: self.io.recovery,
            ..DecodeOptions::default()
        }
    }

    pub fn save_options(&self) -> SaveOptions {
        SaveOptions {
            keep_backup: self.io.keep_backup,
            compression_level: self.io.compression_level.min(9),
            ..SaveOptions::default()
        }
    }
}
