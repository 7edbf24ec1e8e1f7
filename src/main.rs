//! mapforge - inspection tool for OTBM maps
//!
//! Loads a map, prints statistics, checks that it re-encodes byte for byte
//! and converts between `.otbm` and `.otgz`.

mod config;

use anyhow::{bail, Context, Result};
use config::EditorConfig;
use serde::Serialize;
use std::{
    env,
    path::{Path, PathBuf},
};
use tracing::info;

use mapforge_world::otbm::{decode_map, encode_map, EncodeOptions, Recovery, IDENTIFIER_ZERO};
use mapforge_world::{read_map_bytes, Map, MapHeader, MapStats, Warning};

const USAGE: &str = "\
usage: mapforge <command> [options]

commands:
  info <map>              print header and content statistics
  roundtrip <map>         decode and re-encode, report whether bytes match
  convert <map> <output>  load and save under a new name (.otgz is gzip)

options:
  --config <path>         settings file (default config/mapforge.toml)
  --json                  print reports as JSON
  --best-effort           skip damaged tile areas instead of failing
  --keep-backup           keep an overwritten output as <output>~
  --version <n>           OTBM version written by convert";

fn main() -> Result<()> {
    // WARN by default, RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = CliOptions::parse(env::args().skip(1));
    let mut config = match &cli.config {
        Some(path) => EditorConfig::load_from_path(path),
        None => EditorConfig::load(),
    };
    if cli.best_effort {
        config.io.recovery = Recovery::BestEffort;
    }
    if cli.keep_backup {
        config.io.keep_backup = true;
    }

    let Some(command) = cli.command else {
        eprintln!("{USAGE}");
        bail!("no command given");
    };
    let input = cli.input.clone().context("missing map path")?;

    match command {
        Command::Info => {
            let report = info_report(&input, &config)?;
            emit(&report, cli.json, InfoReport::print)
        }
        Command::RoundTrip => {
            let report = round_trip_report(&input, &config)?;
            emit(&report, cli.json, RoundTripReport::print)?;
            if !report.identical {
                bail!("{} does not re-encode to the same bytes", input.display());
            }
            Ok(())
        }
        Command::Convert => {
            let output = cli.output.clone().context("convert needs an output path")?;
            convert(&input, &output, &config, cli.target_version)
        }
    }
}

fn emit<T: Serialize>(report: &T, json: bool, print: fn(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print(report);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Info,
    RoundTrip,
    Convert,
}

#[derive(Debug, Default)]
struct CliOptions {
    command: Option<Command>,
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    config: Option<PathBuf>,
    json: bool,
    best_effort: bool,
    keep_backup: bool,
    target_version: Option<u32>,
}

impl CliOptions {
    fn parse<I: Iterator<Item = String>>(mut args: I) -> Self {
        let mut opts = CliOptions::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--json" => opts.json = true,
                "--best-effort" => opts.best_effort = true,
                "--keep-backup" => opts.keep_backup = true,
                "--config" => {
                    if let Some(path) = args.next() {
                        opts.config = Some(PathBuf::from(path));
                    } else {
                        tracing::error!("--config requires a file path");
                    }
                }
                "--version" => {
                    if let Some(raw) = args.next() {
                        match raw.parse::<u32>() {
                            Ok(value) => opts.target_version = Some(value),
                            Err(err) => {
                                tracing::error!(%err, value = %raw, "--version must be an integer");
                            }
                        }
                    } else {
                        tracing::error!("--version requires an integer");
                    }
                }
                "info" if opts.command.is_none() => opts.command = Some(Command::Info),
                "roundtrip" if opts.command.is_none() => opts.command = Some(Command::RoundTrip),
                "convert" if opts.command.is_none() => opts.command = Some(Command::Convert),
                other if other.starts_with("--") => {
                    tracing::warn!(flag = other, "ignoring unknown flag");
                }
                other => {
                    if opts.input.is_none() {
                        opts.input = Some(PathBuf::from(other));
                    } else if opts.output.is_none() {
                        opts.output = Some(PathBuf::from(other));
                    } else {
                        tracing::warn!(arg = other, "ignoring extra argument");
                    }
                }
            }
        }

        opts
    }
}

#[derive(Debug, Serialize)]
struct InfoReport {
    path: String,
    identifier: String,
    version: u32,
    width: u16,
    height: u16,
    items_version: String,
    descriptions: Vec<String>,
    spawn_file: Option<String>,
    house_file: Option<String>,
    stats: MapStats,
    warnings: Vec<String>,
}

impl InfoReport {
    fn print(&self) {
        println!("{}", self.path);
        println!("  format     {} version {}", self.identifier, self.version);
        println!("  size       {}x{}", self.width, self.height);
        println!("  item set   {}", self.items_version);
        for description in &self.descriptions {
            println!("  about      {description}");
        }
        if let Some(file) = &self.spawn_file {
            println!("  spawns in  {file}");
        }
        if let Some(file) = &self.house_file {
            println!("  houses in  {file}");
        }
        let stats = &self.stats;
        println!("  tiles      {} in {} areas", stats.tiles, stats.chunks);
        println!("  items      {}", stats.items);
        println!("  creatures  {}", stats.creatures);
        println!("  houses     {} ({} tiles)", stats.houses, stats.house_tiles);
        println!("  spawns     {}", stats.spawns);
        println!("  towns      {}", stats.towns);
        println!("  waypoints  {}", stats.waypoints);
        for warning in &self.warnings {
            println!("  warning    {warning}");
        }
    }
}

fn identifier_label(header: &MapHeader) -> String {
    if header.identifier == IDENTIFIER_ZERO {
        "(zero)".to_owned()
    } else {
        String::from_utf8_lossy(&header.identifier).into_owned()
    }
}

fn warning_lines(warnings: &[Warning]) -> Vec<String> {
    warnings.iter().map(ToString::to_string).collect()
}

fn info_report(path: &Path, config: &EditorConfig) -> Result<InfoReport> {
    let map = Map::load_with(path, &config.load_options())
        .with_context(|| format!("failed to load {}", path.display()))?;
    let header = &map.data().header;
    Ok(InfoReport {
        path: path.display().to_string(),
        identifier: identifier_label(header),
        version: header.version,
        width: header.width,
        height: header.height,
        items_version: format!("{}.{}", header.items_major, header.items_minor),
        descriptions: header.descriptions.clone(),
        spawn_file: header.spawn_file.clone(),
        house_file: header.house_file.clone(),
        stats: map.data().stats(),
        warnings: warning_lines(map.warnings()),
    })
}

#[derive(Debug, Serialize)]
struct RoundTripReport {
    path: String,
    bytes: usize,
    crc32: u32,
    reencoded_bytes: usize,
    reencoded_crc32: u32,
    identical: bool,
    first_difference: Option<usize>,
    warnings: Vec<String>,
}

impl RoundTripReport {
    fn print(&self) {
        println!("{}", self.path);
        println!("  read       {} bytes, crc32 {:08x}", self.bytes, self.crc32);
        println!(
            "  written    {} bytes, crc32 {:08x}",
            self.reencoded_bytes, self.reencoded_crc32
        );
        match self.first_difference {
            None => println!("  identical"),
            Some(offset) => println!("  differs from byte {offset}"),
        }
        for warning in &self.warnings {
            println!("  warning    {warning}");
        }
    }
}

fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    a.iter()
        .zip(b)
        .position(|(x, y)| x != y)
        .or_else(|| (a.len() != b.len()).then(|| a.len().min(b.len())))
}

fn round_trip_report(path: &Path, config: &EditorConfig) -> Result<RoundTripReport> {
    let bytes = read_map_bytes(path).with_context(|| format!("failed to read {}", path.display()))?;
    let decoded = decode_map(&bytes, &config.decode_options())
        .with_context(|| format!("failed to decode {}", path.display()))?;
    let again = encode_map(&decoded.map, &EncodeOptions::default())
        .with_context(|| format!("failed to re-encode {}", path.display()))?;
    let difference = first_difference(&bytes, &again);
    Ok(RoundTripReport {
        path: path.display().to_string(),
        bytes: bytes.len(),
        crc32: crc32fast::hash(&bytes),
        reencoded_bytes: again.len(),
        reencoded_crc32: crc32fast::hash(&again),
        identical: difference.is_none(),
        first_difference: difference,
        warnings: warning_lines(&decoded.warnings),
    })
}

fn convert(
    input: &Path,
    output: &Path,
    config: &EditorConfig,
    target_version: Option<u32>,
) -> Result<()> {
    let mut map = Map::load_with(input, &config.load_options())
        .with_context(|| format!("failed to load {}", input.display()))?;
    for warning in map.warnings() {
        tracing::warn!(path = %input.display(), "{warning}");
    }
    let mut options = config.save_options();
    options.encode.target_version = target_version;
    map.save_with(output, &options)
        .with_context(|| format!("failed to save {}", output.display()))?;
    info!(
        from = %input.display(),
        to = %output.display(),
        tiles = map.store().len(),
        "converted map"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapforge_testkit::{map_fingerprint, town_map};

    fn args(list: &[&str]) -> CliOptions {
        CliOptions::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_commands_paths_and_flags() {
        let opts = args(&["convert", "in.otbm", "out.otgz", "--json", "--version", "2"]);
        assert_eq!(opts.command, Some(Command::Convert));
        assert_eq!(opts.input, Some(PathBuf::from("in.otbm")));
        assert_eq!(opts.output, Some(PathBuf::from("out.otgz")));
        assert!(opts.json);
        assert_eq!(opts.target_version, Some(2));

        let opts = args(&["--best-effort", "info", "map.otbm", "--version", "x"]);
        assert_eq!(opts.command, Some(Command::Info));
        assert!(opts.best_effort);
        assert_eq!(opts.target_version, None);
    }

    #[test]
    fn a_second_command_word_is_a_path() {
        let opts = args(&["info", "info"]);
        assert_eq!(opts.command, Some(Command::Info));
        assert_eq!(opts.input, Some(PathBuf::from("info")));
    }

    #[test]
    fn first_difference_reports_length_changes() {
        assert_eq!(first_difference(b"abc", b"abc"), None);
        assert_eq!(first_difference(b"abc", b"abd"), Some(2));
        assert_eq!(first_difference(b"abc", b"ab"), Some(2));
    }

    #[test]
    fn reports_and_conversion_work_on_a_saved_map() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("town.otbm");
        let packed = dir.path().join("town.otgz");
        Map::from_data(town_map()).save(&plain).unwrap();
        let config = EditorConfig::default();

        let info = info_report(&plain, &config).unwrap();
        assert_eq!(info.identifier, "OTBM");
        assert_eq!(info.stats, town_map().stats());
        assert!(info.warnings.is_empty());

        let report = round_trip_report(&plain, &config).unwrap();
        assert!(report.identical);
        assert_eq!(report.crc32, report.reencoded_crc32);

        convert(&plain, &packed, &config, None).unwrap();
        let converted = Map::load(&packed).unwrap();
        assert_eq!(
            map_fingerprint(converted.data()).unwrap(),
            map_fingerprint(&town_map()).unwrap()
        );
    }
}
