use bytes::Bytes;
use cutout_logging::{cutout_debug, cutout_info, cutout_warn};
use thiserror::Error;

use crate::item::{ExportEntry, Item, ItemId, ItemState};
use crate::resource::{Artifact, Handle, ResourceManager, ResourceStats};
use crate::source::{AcquisitionFilteredOut, AddReport, FilterReason, SourceFile};
use crate::view_model::{CollectionView, ItemRowView};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CollectionError {
    #[error("no item with id {0}")]
    UnknownItem(ItemId),
    #[error("item {id} cannot {action} while {from}")]
    InvalidTransition {
        id: ItemId,
        from: ItemState,
        action: &'static str,
    },
}

/// Ordered set of items plus the resource manager that owns their handles.
///
/// Insertion order is both display order and scheduling order.
#[derive(Debug)]
pub struct Collection {
    items: Vec<Item>,
    resources: ResourceManager,
    next_id: ItemId,
}

impl Default for Collection {
    fn default() -> Self {
        Self::new()
    }
}

impl Collection {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            resources: ResourceManager::new(),
            next_id: 1,
        }
    }

    /// Appends supported files as `pending` items; everything else is reported back.
    pub fn add_sources<I>(&mut self, files: I) -> AddReport
    where
        I: IntoIterator<Item = SourceFile>,
    {
        let mut report = AddReport::default();
        for file in files {
            let reason = if file.bytes.is_empty() {
                Some(FilterReason::Empty)
            } else if !file.is_supported_image() {
                Some(FilterReason::UnsupportedType)
            } else {
                None
            };
            if let Some(reason) = reason {
                cutout_debug!("filtered out {} ({:?})", file.name, reason);
                report.filtered_out.push(AcquisitionFilteredOut {
                    name: file.name,
                    reason,
                });
                continue;
            }

            let id = self.next_id;
            self.next_id += 1;
            let source = self.resources.acquire(file.bytes);
            cutout_debug!("item {} added from {}", id, file.name);
            self.items.push(Item::new(id, file.name, source));
            report.added.push(id);
        }
        report
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(Item::id).collect()
    }

    /// Allowed in any state; never triggers a transition.
    pub fn set_keep_original(&mut self, id: ItemId, keep: bool) -> Result<(), CollectionError> {
        self.item_mut(id)?.set_keep_original(keep);
        Ok(())
    }

    /// Queues a `done` or `error` item for another pass on the next run.
    ///
    /// Returns `false` when the item was already waiting to run.
    pub fn request_rerun(&mut self, id: ItemId) -> Result<bool, CollectionError> {
        self.item_mut(id)?.request_rerun()
    }

    /// First runnable item positioned after `after`, in collection order.
    ///
    /// Ids grow with position, so `after` acts as a scan cursor: positions at
    /// or before it are left for a later scan.
    pub fn next_runnable(&self, after: Option<ItemId>) -> Option<ItemId> {
        self.items
            .iter()
            .filter(|item| after.map_or(true, |cursor| item.id() > cursor))
            .find(|item| item.is_runnable())
            .map(Item::id)
    }

    /// Moves an item to `processing` and hands out its source bytes.
    pub fn begin_processing(&mut self, id: ItemId) -> Result<Bytes, CollectionError> {
        let item = self.item_mut(id)?;
        let input = item.begin()?;
        cutout_debug!("item {} -> processing", id);
        Ok(input)
    }

    /// Returns the stored progress, or `None` if the item is not processing.
    pub fn record_progress(&mut self, id: ItemId, percent: u8) -> Option<u8> {
        self.item_mut(id).ok()?.record_progress(percent)
    }

    /// Stores a successful result. The new handle is acquired before the
    /// superseded one is released.
    pub fn complete(&mut self, id: ItemId, result: Bytes) -> Result<(), CollectionError> {
        let index = self.index_of(id)?;
        self.items[index].ensure_processing("complete")?;
        let artifact = self.resources.acquire(result);
        let superseded = self.items[index].finish(artifact);
        self.release_all(superseded);
        cutout_debug!("item {} -> done", id);
        Ok(())
    }

    pub fn fail(&mut self, id: ItemId, message: impl Into<String>) -> Result<(), CollectionError> {
        let index = self.index_of(id)?;
        self.items[index].ensure_processing("fail")?;
        let message = message.into();
        cutout_warn!("item {} -> error: {}", id, message);
        let superseded = self.items[index].fail(message);
        self.release_all(superseded);
        Ok(())
    }

    /// Returns an interrupted item to the state it had before processing began.
    pub fn abandon_processing(&mut self, id: ItemId) {
        if let Ok(item) = self.item_mut(id) {
            item.abandon();
            cutout_debug!("item {} abandoned -> {}", id, item.state());
        }
    }

    /// Destroys one item and releases every handle it holds.
    pub fn remove(&mut self, id: ItemId) -> Result<(), CollectionError> {
        let index = self.index_of(id)?;
        let item = self.items.remove(index);
        self.release_all(item.into_artifacts());
        cutout_debug!("item {} removed", id);
        Ok(())
    }

    /// Destroys every item and releases every handle.
    pub fn clear(&mut self) {
        let items = std::mem::take(&mut self.items);
        let count = items.len();
        for item in items {
            self.release_all(item.into_artifacts());
        }
        cutout_info!("cleared {} items", count);
    }

    /// The single-item download: same selection rule as the archive.
    pub fn download(&self, id: ItemId, output_extension: &str) -> Option<ExportEntry> {
        self.get(id)?.export_entry(output_extension)
    }

    /// Exportable entries in collection order; items with nothing to export are skipped.
    pub fn export_entries(&self, output_extension: &str) -> Vec<ExportEntry> {
        self.items
            .iter()
            .filter_map(|item| item.export_entry(output_extension))
            .collect()
    }

    pub fn resolve(&self, handle: &Handle) -> Option<Bytes> {
        self.resources.resolve(handle)
    }

    pub fn resource_stats(&self) -> ResourceStats {
        self.resources.stats()
    }

    pub fn view(&self) -> CollectionView {
        let mut view = CollectionView::default();
        for item in &self.items {
            match item.state() {
                ItemState::Pending => view.pending += 1,
                ItemState::Processing => view.processing += 1,
                ItemState::Done => view.done += 1,
                ItemState::Error => view.failed += 1,
            }
            if item.keep_original() || item.result_bytes().is_some() {
                view.exportable += 1;
            }
            view.items.push(ItemRowView {
                id: item.id(),
                name: item.source_name().to_string(),
                state: item.state(),
                progress: item.progress(),
                error: item.error_info().map(ToOwned::to_owned),
                keep_original: item.keep_original(),
                preview: item.preview_handle().clone(),
            });
        }
        view
    }

    fn index_of(&self, id: ItemId) -> Result<usize, CollectionError> {
        self.items
            .iter()
            .position(|item| item.id() == id)
            .ok_or(CollectionError::UnknownItem(id))
    }

    fn item_mut(&mut self, id: ItemId) -> Result<&mut Item, CollectionError> {
        let index = self.index_of(id)?;
        Ok(&mut self.items[index])
    }

    fn release_all(&mut self, artifacts: impl IntoIterator<Item = Artifact>) {
        for artifact in artifacts {
            let released = self.resources.release(artifact);
            debug_assert!(released.is_ok(), "handle released twice: {released:?}");
        }
    }
}

