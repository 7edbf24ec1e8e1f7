//! Path level load and save.
//!
//! `.otgz` files hold the same bytes as `.otbm` inside a gzip stream. Saving
//! moves an existing file to `<file>~` first and puts it back if the write
//! fails. Companion spawn/house files named in the header live next to the
//! map and are read and written with it.

use std::fs;
use std::io::{self, Read, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{info, warn};

use crate::history::HistoryConfig;
use crate::otbm::{
    check_house_references, check_spawn_references, decode_houses, decode_map_observed,
    decode_spawns, encode_houses, encode_map_observed, encode_spawns, DecodeOptions, Decoded,
    EncodeOptions, Observer,
};
use crate::{Map, MapData, MapError, Warning};

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub decode: DecodeOptions,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Keep the previous file as `<file>~` after a successful save.
    pub keep_backup: bool,
    /// gzip level (0..=9) for `.otgz` targets.
    pub compression_level: u32,
    pub encode: EncodeOptions,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            keep_backup: false,
            compression_level: 6,
            encode: EncodeOptions::default(),
        }
    }
}

/// Whether a path names a gzip-wrapped map.
pub fn is_compressed(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("otgz"))
}

/// Where the previous version of `path` is kept during a save.
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push("~");
    PathBuf::from(name)
}

fn compress(data: &[u8], level: u32) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    encoder.finish()
}

fn decompress(compressed: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// Raw OTBM bytes of a map file, unwrapped from gzip when needed.
pub fn read_map_bytes(path: &Path) -> Result<Vec<u8>, MapError> {
    let raw = fs::read(path).map_err(|err| MapError::io(path, err))?;
    if is_compressed(path) {
        decompress(&raw).map_err(|err| MapError::io(path, err))
    } else {
        Ok(raw)
    }
}

/// Read and decode a map file plus its companions.
pub fn read_map_file(
    path: &Path,
    options: &DecodeOptions,
    observer: &mut Observer<'_>,
) -> Result<Decoded, MapError> {
    let bytes = read_map_bytes(path)?;
    let mut decoded = decode_map_observed(&bytes, options, observer)?;
    load_companions(path, &mut decoded)?;

    for warning in &decoded.warnings {
        warn!(path = %path.display(), "{warning}");
    }
    info!(
        path = %path.display(),
        bytes = bytes.len(),
        tiles = decoded.map.store.len(),
        warnings = decoded.warnings.len(),
        "loaded map"
    );
    Ok(decoded)
}

fn companion_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

fn read_companion(path: &Path, warnings: &mut Vec<Warning>) -> Result<Option<Vec<u8>>, MapError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warnings.push(Warning::MissingCompanion {
                path: path.to_path_buf(),
            });
            Ok(None)
        }
        Err(err) => Err(MapError::io(path, err)),
    }
}

fn load_companions(path: &Path, decoded: &mut Decoded) -> Result<(), MapError> {
    let dir = companion_dir(path);
    let header = decoded.map.header.clone();

    if let Some(name) = &header.spawn_file {
        let file = dir.join(name);
        if let Some(bytes) = read_companion(&file, &mut decoded.warnings)? {
            let (spawns, warnings) = decode_spawns(&bytes)?;
            decoded.map.spawns = spawns;
            decoded.warnings.extend(warnings);
            decoded.warnings.extend(check_spawn_references(&decoded.map));
        }
    }
    if let Some(name) = &header.house_file {
        let file = dir.join(name);
        if let Some(bytes) = read_companion(&file, &mut decoded.warnings)? {
            let (houses, warnings) = decode_houses(&bytes)?;
            decoded.map.houses = houses;
            decoded.warnings.extend(warnings);
            decoded.warnings.extend(check_house_references(&decoded.map));
        }
    }
    Ok(())
}

/// Encode and write a map plus its named companions.
pub fn write_map_file(
    path: &Path,
    data: &MapData,
    options: &SaveOptions,
    observer: &mut Observer<'_>,
) -> Result<(), MapError> {
    let encoded = encode_map_observed(data, &options.encode, observer)?;
    let bytes = if is_compressed(path) {
        compress(&encoded, options.compression_level).map_err(|err| MapError::io(path, err))?
    } else {
        encoded
    };
    write_with_backup(path, &bytes, options.keep_backup)?;

    let dir = companion_dir(path);
    if let Some(name) = &data.header.spawn_file {
        write_with_backup(&dir.join(name), &encode_spawns(&data.spawns)?, options.keep_backup)?;
    }
    if let Some(name) = &data.header.house_file {
        write_with_backup(&dir.join(name), &encode_houses(&data.houses)?, options.keep_backup)?;
    }

    info!(
        path = %path.display(),
        bytes = bytes.len(),
        tiles = data.store.len(),
        "saved map"
    );
    Ok(())
}

/// Replace `path` with `bytes`, keeping the old file at `<path>~` until the
/// write has succeeded.
fn write_with_backup(path: &Path, bytes: &[u8], keep_backup: bool) -> Result<(), MapError> {
    let backup = backup_path(path);
    let had_original = path.exists();
    if had_original {
        fs::rename(path, &backup).map_err(|err| MapError::io(path, err))?;
    }

    if let Err(err) = fs::write(path, bytes) {
        if had_original {
            let _ = fs::remove_file(path);
            if let Err(restore) = fs::rename(&backup, path) {
                warn!(
                    path = %path.display(),
                    error = %restore,
                    "could not restore backup after failed save"
                );
            }
        }
        return Err(MapError::io(path, err));
    }

    if had_original && !keep_backup {
        if let Err(err) = fs::remove_file(&backup) {
            warn!(path = %backup.display(), error = %err, "could not remove backup");
        }
    }
    Ok(())
}

fn keep_going(_: crate::otbm::Progress) -> ControlFlow<()> {
    ControlFlow::Continue(())
}

impl Map {
    pub fn load(path: impl AsRef<Path>) -> Result<Map, MapError> {
        Self::load_with(path, &LoadOptions::default())
    }

    pub fn load_with(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Map, MapError> {
        let path = path.as_ref();
        let decoded = read_map_file(path, &options.decode, &mut keep_going)?;
        let mut map = Map::default().with_history(options.history.clone());
        map.replace_with(decoded, Some(path.to_path_buf()));
        Ok(map)
    }

    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), MapError> {
        self.save_with(path, &SaveOptions::default())
    }

    pub fn save_with(&mut self, path: impl AsRef<Path>, options: &SaveOptions) -> Result<(), MapError> {
        let path = path.as_ref();
        write_map_file(path, self.data(), options, &mut keep_going)?;
        self.mark_saved(path.to_path_buf());
        Ok(())
    }
}
