//! Cutout core: item state machine, collection and handle accounting.
mod collection;
mod filename;
mod item;
mod resource;
mod source;
mod view_model;

pub use collection::{Collection, CollectionError};
pub use filename::{derive_output_name, sanitize_file_name, suffixed_name};
pub use item::{ExportEntry, Item, ItemId, ItemState};
pub use resource::{Artifact, Handle, ResourceError, ResourceManager, ResourceStats};
pub use source::{AcquisitionFilteredOut, AddReport, FilterReason, SourceFile};
pub use view_model::{CollectionView, ItemRowView};
