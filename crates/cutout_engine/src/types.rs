use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use cutout_core::ItemId;

pub const DEFAULT_QUALITY: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Png,
    Webp,
    Jpeg,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown output format {0:?}")]
pub struct UnknownFormat(pub String);

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" | "image/png" => Ok(OutputFormat::Png),
            "webp" | "image/webp" => Ok(OutputFormat::Webp),
            "jpg" | "jpeg" | "image/jpeg" => Ok(OutputFormat::Jpeg),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Options handed to the transform for every item.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformConfig {
    pub output_format: OutputFormat,
    /// Encoder quality in `[0, 1]`.
    pub quality: f32,
    pub timeout: Option<Duration>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::Png,
            quality: DEFAULT_QUALITY,
            timeout: None,
        }
    }
}

impl TransformConfig {
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = clamp_quality(quality);
        self
    }

    /// Quality as handed to a backend; literals that skipped
    /// [`TransformConfig::with_quality`] are clamped here.
    pub fn effective_quality(&self) -> f32 {
        clamp_quality(self.quality)
    }
}

fn clamp_quality(quality: f32) -> f32 {
    if quality.is_finite() {
        quality.clamp(0.0, 1.0)
    } else {
        DEFAULT_QUALITY
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransformError {
    pub kind: FailureKind,
    pub message: String,
}

impl TransformError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    EmptyInput,
    EmptyOutput,
    Spawn,
    ExitStatus(Option<i32>),
    Timeout,
    Io,
    Backend,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::EmptyInput => write!(f, "empty input"),
            FailureKind::EmptyOutput => write!(f, "empty output"),
            FailureKind::Spawn => write!(f, "could not start transform"),
            FailureKind::ExitStatus(Some(code)) => write!(f, "transform exited with status {code}"),
            FailureKind::ExitStatus(None) => write!(f, "transform terminated by signal"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Io => write!(f, "io error"),
            FailureKind::Backend => write!(f, "transform failed"),
        }
    }
}

/// Latest progress of the item being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub item_id: ItemId,
    pub percent: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Another run was already in flight; nothing was done.
    AlreadyRunning,
    Finished(RunSummary),
}
