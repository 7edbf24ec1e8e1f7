#![warn(missing_docs)]
//! Fixtures and helpers shared by the map tests.

mod fixtures;
mod random;

use anyhow::{Context, Result};
use crc32fast::Hasher;
use mapforge_world::otbm::{encode_map, EncodeOptions};
use mapforge_world::MapData;
use tempfile::TempDir;

pub use fixtures::*;
pub use random::*;

/// CRC32 of a byte buffer, for compact golden comparisons.
pub fn fingerprint(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// CRC32 of the canonical encoding of a map.
pub fn map_fingerprint(map: &MapData) -> Result<u32> {
    let bytes = encode_map(map, &EncodeOptions::default()).context("Failed to encode map")?;
    Ok(fingerprint(&bytes))
}

/// Fresh temporary directory, removed when dropped.
pub fn scratch_dir(label: &str) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(&format!("mapforge-{label}-"))
        .tempdir()
        .with_context(|| format!("Failed to create scratch directory for {label}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(fingerprint(b""), 0);
        assert_eq!(fingerprint(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let dir = scratch_dir("drop").unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.exists());
        drop(dir);
        assert!(!path.exists());
    }
}
