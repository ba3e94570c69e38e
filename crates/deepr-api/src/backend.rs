//! Backend abstraction for the request/response endpoints

use async_trait::async_trait;

use crate::{
    client::ResearchClient,
    error::Result,
    types::{BookmarkState, HistoryItem, ModelInfo, Settings, SettingsUpdate},
};

/// The CRUD side of the research backend (history, bookmarks, settings).
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    async fn history(&self) -> Result<Vec<HistoryItem>>;

    async fn toggle_bookmark(&self, task_id: &str) -> Result<BookmarkState>;

    async fn delete_research(&self, task_id: &str) -> Result<()>;

    async fn settings(&self) -> Result<Settings>;

    async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings>;

    async fn models(&self) -> Result<Vec<ModelInfo>>;
}

#[async_trait]
impl ResearchBackend for ResearchClient {
    async fn history(&self) -> Result<Vec<HistoryItem>> {
        ResearchClient::history(self).await
    }

    async fn toggle_bookmark(&self, task_id: &str) -> Result<BookmarkState> {
        ResearchClient::toggle_bookmark(self, task_id).await
    }

    async fn delete_research(&self, task_id: &str) -> Result<()> {
        ResearchClient::delete_research(self, task_id).await
    }

    async fn settings(&self) -> Result<Settings> {
        ResearchClient::settings(self).await
    }

    async fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings> {
        ResearchClient::update_settings(self, update).await
    }

    async fn models(&self) -> Result<Vec<ModelInfo>> {
        ResearchClient::models(self).await
    }
}
