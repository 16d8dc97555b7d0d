use crate::{Handle, ItemId, ItemState};

/// Read-only snapshot of the collection for display.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectionView {
    pub items: Vec<ItemRowView>,
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
    pub exportable: usize,
}

impl CollectionView {
    /// True once no item is waiting for or undergoing a transform.
    pub fn is_settled(&self) -> bool {
        self.pending == 0 && self.processing == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemRowView {
    pub id: ItemId,
    pub name: String,
    pub state: ItemState,
    pub progress: u8,
    pub error: Option<String>,
    pub keep_original: bool,
    pub preview: Handle,
}
