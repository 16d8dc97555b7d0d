use std::path::PathBuf;

use clap::{ArgAction, Parser};
use cutout_engine::OutputFormat;

/// Remove image backgrounds in batch and export the results.
#[derive(Debug, Parser)]
#[command(name = "cutout", version)]
pub struct Cli {
    /// Image files to process (png, jpeg, webp).
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// RON config file. Defaults to `cutout.ron` when present.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Background-removal program; reads image bytes on stdin, writes the result to stdout.
    #[arg(long)]
    pub program: Option<String>,

    /// Argument passed to the program; repeat for more. `{format}` and `{quality}` are substituted.
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,

    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Encoder quality in [0, 1].
    #[arg(long)]
    pub quality: Option<f32>,

    /// Per-item limit; 0 disables it.
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Bundle all results into one zip. Without a path, `cutout-<timestamp>.zip` in the output dir.
    #[arg(long, value_name = "PATH", num_args = 0..=1, require_equals = true)]
    pub archive: Option<Option<PathBuf>>,

    #[arg(long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Export this input unmodified; repeat for more.
    #[arg(long = "keep-original", value_name = "NAME")]
    pub keep_original: Vec<String>,

    /// Rename colliding export names instead of letting the last one win.
    #[arg(long)]
    pub suffix_collisions: bool,

    #[arg(long)]
    pub deflate: bool,

    /// Add manifest.json to the archive.
    #[arg(long)]
    pub manifest: bool,

    /// Also log to ./cutout.log.
    #[arg(long)]
    pub log_file: bool,

    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}
