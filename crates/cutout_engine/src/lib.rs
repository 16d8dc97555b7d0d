//! Cutout engine: transform adapter, batch scheduler and export.
mod command;
mod engine;
mod export;
mod persist;
mod scheduler;
mod transform;
mod types;

pub use command::{parse_progress_line, CommandSettings, CommandTransform};
pub use engine::{EngineEvent, EngineHandle};
pub use export::{
    build_archive, collect_archive_entries, encode_entries, resolve_collisions, write_downloads,
    ArchiveCompression, ArchiveEncoder, ArchiveEntry, CollisionPolicy, ExportError, ExportOptions,
    ZipEncoder, MANIFEST_NAME,
};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use scheduler::{BatchScheduler, SharedCollection};
pub use transform::{
    progress_percent, ProgressSink, StageProgress, Transform, TransformAdapter,
    UNKNOWN_PROGRESS_PERCENT,
};
pub use types::{
    FailureKind, OutputFormat, ProgressUpdate, RunOutcome, RunSummary, TransformConfig,
    TransformError, UnknownFormat, DEFAULT_QUALITY,
};
