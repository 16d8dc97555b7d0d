//! RON config file merged with command-line flags.
//!
//! Every file field is optional; flags win over file values.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cutout_engine::{
    ArchiveCompression, CollisionPolicy, CommandSettings, ExportOptions, OutputFormat,
    TransformConfig,
};
use cutout_logging::{cutout_debug, cutout_info};
use ron::extensions::Extensions;
use serde::Deserialize;

use crate::cli::Cli;

pub const DEFAULT_CONFIG_FILE: &str = "cutout.ron";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Collisions {
    LastWriteWins,
    Suffix,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub format: Option<String>,
    pub quality: Option<f32>,
    pub timeout_secs: Option<u64>,
    pub out_dir: Option<PathBuf>,
    pub collisions: Option<Collisions>,
    pub deflate: Option<bool>,
    pub manifest: Option<bool>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        let options = ron::Options::default().with_default_extension(Extensions::IMPLICIT_SOME);
        Ok(options.from_str(text)?)
    }
}

/// Reads the config file. A missing default file means "no config"; a missing
/// explicit file is an error.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    let path = explicit.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound && explicit.is_none() => {
            cutout_debug!("No config file at {:?}; using defaults", path);
            return Ok(FileConfig::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config {:?}", path));
        }
    };

    let config =
        FileConfig::parse(&text).with_context(|| format!("failed to parse config {:?}", path))?;
    cutout_info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Effective settings for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub command: CommandSettings,
    pub transform: TransformConfig,
    pub export: ExportOptions,
    pub out_dir: PathBuf,
}

impl Settings {
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self> {
        let Some(program) = cli.program.clone().or(file.program) else {
            bail!(
                "no transform program configured; pass --program or set `program` in {}",
                DEFAULT_CONFIG_FILE
            );
        };
        let args = if cli.args.is_empty() {
            file.args.unwrap_or_default()
        } else {
            cli.args.clone()
        };

        let output_format = match (cli.format, file.format) {
            (Some(format), _) => format,
            (None, Some(name)) => name
                .parse::<OutputFormat>()
                .context("invalid `format` in config")?,
            (None, None) => OutputFormat::default(),
        };
        let mut transform = TransformConfig {
            output_format,
            timeout: cli
                .timeout_secs
                .or(file.timeout_secs)
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            ..TransformConfig::default()
        };
        if let Some(quality) = cli.quality.or(file.quality) {
            transform = transform.with_quality(quality);
        }

        let mut export = ExportOptions::for_format(output_format);
        export.collision = if cli.suffix_collisions {
            CollisionPolicy::Suffix
        } else {
            match file.collisions {
                Some(Collisions::Suffix) => CollisionPolicy::Suffix,
                Some(Collisions::LastWriteWins) | None => CollisionPolicy::LastWriteWins,
            }
        };
        if cli.deflate || file.deflate.unwrap_or(false) {
            export.compression = ArchiveCompression::Deflated;
        }
        export.include_manifest = cli.manifest || file.manifest.unwrap_or(false);

        Ok(Self {
            command: CommandSettings { program, args },
            transform,
            export,
            out_dir: cli
                .out_dir
                .clone()
                .or(file.out_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}
