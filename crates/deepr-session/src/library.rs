//! Past research runs: listing, bookmarking, and deletion

use std::sync::Arc;

use deepr_api::{HistoryItem, ResearchBackend};
use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    mutation::optimistic,
};

/// Locally cached history with optimistic bookmark/delete.
pub struct HistoryLibrary {
    backend: Arc<dyn ResearchBackend>,
    items: Mutex<Vec<HistoryItem>>,
}

impl HistoryLibrary {
    pub fn new(backend: Arc<dyn ResearchBackend>) -> Self {
        Self {
            backend,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Reload the list from the backend
    pub async fn refresh(&self) -> Result<Vec<HistoryItem>> {
        let items = self.backend.history().await?;
        tracing::debug!("Loaded {} history items", items.len());
        *self.items.lock() = items.clone();
        Ok(items)
    }

    /// Cached items, newest first as returned by the backend
    pub fn items(&self) -> Vec<HistoryItem> {
        self.items.lock().clone()
    }

    /// Cached items that are bookmarked
    pub fn bookmarked(&self) -> Vec<HistoryItem> {
        self.items
            .lock()
            .iter()
            .filter(|i| i.bookmarked())
            .cloned()
            .collect()
    }

    pub fn find(&self, task_id: &str) -> Option<HistoryItem> {
        self.items
            .lock()
            .iter()
            .find(|i| i.task_id == task_id)
            .cloned()
    }

    /// Flip the bookmark flag locally, then confirm with the backend.
    ///
    /// The server's answer wins on success; the previous flag is restored on
    /// failure.
    pub async fn toggle_bookmark(&self, task_id: &str) -> Result<bool> {
        if self.find(task_id).is_none() {
            return Err(Error::UnknownTask(task_id.to_string()));
        }

        let state = optimistic(
            || self.bookmark_flag(task_id),
            || {
                let current = self.bookmark_flag(task_id).unwrap_or(false);
                self.set_bookmark_flag(task_id, Some(!current));
            },
            |previous| self.set_bookmark_flag(task_id, previous),
            || self.backend.toggle_bookmark(task_id),
        )
        .await?;

        self.set_bookmark_flag(task_id, Some(state.is_bookmarked));
        Ok(state.is_bookmarked)
    }

    /// Remove an item locally, then delete it on the backend.
    ///
    /// On failure the item is put back at its original position.
    pub async fn delete(&self, task_id: &str) -> Result<()> {
        let position = self
            .items
            .lock()
            .iter()
            .position(|i| i.task_id == task_id)
            .ok_or_else(|| Error::UnknownTask(task_id.to_string()))?;

        optimistic(
            || self.items.lock().get(position).cloned(),
            || {
                self.items.lock().retain(|i| i.task_id != task_id);
            },
            |removed| {
                if let Some(item) = removed {
                    let mut items = self.items.lock();
                    let at = position.min(items.len());
                    items.insert(at, item);
                }
            },
            || self.backend.delete_research(task_id),
        )
        .await?;

        tracing::info!("Deleted research run {}", task_id);
        Ok(())
    }

    fn bookmark_flag(&self, task_id: &str) -> Option<bool> {
        self.items
            .lock()
            .iter()
            .find(|i| i.task_id == task_id)
            .and_then(|i| i.is_bookmarked)
    }

    fn set_bookmark_flag(&self, task_id: &str, flag: Option<bool>) {
        if let Some(item) = self.items.lock().iter_mut().find(|i| i.task_id == task_id) {
            item.is_bookmarked = flag;
        }
    }
}
