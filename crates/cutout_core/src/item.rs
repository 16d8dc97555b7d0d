use std::fmt;

use bytes::Bytes;

use crate::filename::derive_output_name;
use crate::resource::{Artifact, Handle};
use crate::CollectionError;

pub type ItemId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ItemState {
    #[default]
    Pending,
    Processing,
    Done,
    Error,
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemState::Pending => "pending",
            ItemState::Processing => "processing",
            ItemState::Done => "done",
            ItemState::Error => "error",
        };
        f.write_str(label)
    }
}

/// What a download or archive should contain for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportEntry {
    pub item_id: ItemId,
    pub name: String,
    pub bytes: Bytes,
    pub original: bool,
}

/// One image and everything derived from it.
///
/// Processing fields are only changed through the transitions below, which
/// the collection drives on behalf of the scheduler.
#[derive(Debug)]
pub struct Item {
    id: ItemId,
    source_name: String,
    source: Artifact,
    result: Option<Artifact>,
    // Previous result kept alive while a re-run is in flight.
    superseded: Option<Artifact>,
    state: ItemState,
    progress: u8,
    error: Option<String>,
    // Previous error, restored if a retry is interrupted.
    superseded_error: Option<String>,
    keep_original: bool,
    rerun_requested: bool,
}

impl Item {
    pub(crate) fn new(id: ItemId, source_name: String, source: Artifact) -> Self {
        Self {
            id,
            source_name,
            source,
            result: None,
            superseded: None,
            state: ItemState::Pending,
            progress: 0,
            error: None,
            superseded_error: None,
            keep_original: false,
            rerun_requested: false,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn source_bytes(&self) -> &Bytes {
        self.source.bytes()
    }

    pub fn source_handle(&self) -> &Handle {
        self.source.handle()
    }

    /// Present exactly when the state is `Done`.
    pub fn result_bytes(&self) -> Option<&Bytes> {
        self.result.as_ref().map(Artifact::bytes)
    }

    pub fn result_handle(&self) -> Option<&Handle> {
        self.result.as_ref().map(Artifact::handle)
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error_info(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn keep_original(&self) -> bool {
        self.keep_original
    }

    pub fn rerun_requested(&self) -> bool {
        self.rerun_requested
    }

    /// Handle to show for this item: the result unless the original is kept.
    pub fn preview_handle(&self) -> &Handle {
        match (&self.result, self.keep_original) {
            (Some(result), false) => result.handle(),
            _ => self.source.handle(),
        }
    }

    /// Whether the scheduler should pick this item up.
    pub fn is_runnable(&self) -> bool {
        match self.state {
            ItemState::Pending | ItemState::Error => true,
            ItemState::Done => self.rerun_requested,
            ItemState::Processing => false,
        }
    }

    /// Original bytes when `keep_original` is set, else the result, else nothing.
    pub fn export_entry(&self, output_extension: &str) -> Option<ExportEntry> {
        if self.keep_original {
            return Some(ExportEntry {
                item_id: self.id,
                name: self.source_name.clone(),
                bytes: self.source.bytes().clone(),
                original: true,
            });
        }
        self.result.as_ref().map(|result| ExportEntry {
            item_id: self.id,
            name: derive_output_name(&self.source_name, output_extension),
            bytes: result.bytes().clone(),
            original: false,
        })
    }

    pub(crate) fn set_keep_original(&mut self, keep: bool) {
        self.keep_original = keep;
    }

    pub(crate) fn request_rerun(&mut self) -> Result<bool, CollectionError> {
        match self.state {
            ItemState::Pending => Ok(false),
            ItemState::Done | ItemState::Error => {
                let changed = !self.rerun_requested;
                self.rerun_requested = true;
                Ok(changed)
            }
            ItemState::Processing => Err(self.invalid("request_rerun")),
        }
    }

    pub(crate) fn begin(&mut self) -> Result<Bytes, CollectionError> {
        if !self.is_runnable() {
            return Err(self.invalid("begin"));
        }
        if let Some(previous) = self.result.take() {
            self.superseded = Some(previous);
        }
        self.superseded_error = self.error.take();
        self.progress = 0;
        self.state = ItemState::Processing;
        Ok(self.source.bytes().clone())
    }

    /// Raises progress to `percent` (clamped to 100), never lowering it.
    pub(crate) fn record_progress(&mut self, percent: u8) -> Option<u8> {
        if self.state != ItemState::Processing {
            return None;
        }
        self.progress = self.progress.max(percent.min(100));
        Some(self.progress)
    }

    pub(crate) fn ensure_processing(&self, action: &'static str) -> Result<(), CollectionError> {
        if self.state == ItemState::Processing {
            Ok(())
        } else {
            Err(self.invalid(action))
        }
    }

    /// Returns the superseded result, which the caller must release.
    pub(crate) fn finish(&mut self, result: Artifact) -> Option<Artifact> {
        self.result = Some(result);
        self.state = ItemState::Done;
        self.progress = 100;
        self.settle()
    }

    /// Returns the superseded result, which the caller must release.
    pub(crate) fn fail(&mut self, message: String) -> Option<Artifact> {
        self.error = Some(message);
        self.state = ItemState::Error;
        self.settle()
    }

    fn settle(&mut self) -> Option<Artifact> {
        self.rerun_requested = false;
        self.superseded_error = None;
        self.superseded.take()
    }

    /// Puts an interrupted item back where it was before `begin`, including
    /// a pending re-run request.
    pub(crate) fn abandon(&mut self) {
        if self.state != ItemState::Processing {
            return;
        }
        self.progress = 0;
        self.state = match (self.superseded.take(), self.superseded_error.take()) {
            (Some(previous), _) => {
                self.result = Some(previous);
                ItemState::Done
            }
            (None, Some(error)) => {
                self.error = Some(error);
                ItemState::Error
            }
            (None, None) => ItemState::Pending,
        };
    }

    pub(crate) fn into_artifacts(self) -> impl Iterator<Item = Artifact> {
        std::iter::once(self.source)
            .chain(self.result)
            .chain(self.superseded)
    }

    fn invalid(&self, action: &'static str) -> CollectionError {
        CollectionError::InvalidTransition {
            id: self.id,
            from: self.state,
            action,
        }
    }
}
