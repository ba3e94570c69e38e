//! Backend model settings with optimistic updates

use std::sync::Arc;

use deepr_api::{ModelInfo, ResearchBackend, Settings, SettingsUpdate};
use parking_lot::Mutex;

use crate::{
    error::{Error, Result},
    mutation::optimistic,
};

/// Cached copy of the backend settings
pub struct SettingsStore {
    backend: Arc<dyn ResearchBackend>,
    current: Mutex<Option<Settings>>,
}

impl SettingsStore {
    pub fn new(backend: Arc<dyn ResearchBackend>) -> Self {
        Self {
            backend,
            current: Mutex::new(None),
        }
    }

    /// Fetch settings from the backend
    pub async fn load(&self) -> Result<Settings> {
        let settings = self.backend.settings().await?;
        *self.current.lock() = Some(settings.clone());
        Ok(settings)
    }

    /// Last known settings
    pub fn current(&self) -> Option<Settings> {
        self.current.lock().clone()
    }

    /// Validate and apply an update; the local copy changes before the
    /// backend answers and is restored if it rejects the write.
    pub async fn update(&self, update: SettingsUpdate) -> Result<Settings> {
        validate(&update)?;

        if self.current().is_none() {
            self.load().await?;
        }
        if update.is_empty() {
            return self.current().ok_or_else(|| {
                Error::InvalidSetting("backend returned no settings".to_string())
            });
        }

        let saved = optimistic(
            || self.current.lock().clone(),
            || {
                if let Some(settings) = self.current.lock().as_mut() {
                    settings.apply(&update);
                }
            },
            |previous| *self.current.lock() = previous,
            || self.backend.update_settings(&update),
        )
        .await?;

        tracing::info!(model = %saved.model_name, "Settings updated");
        *self.current.lock() = Some(saved.clone());
        Ok(saved)
    }

    /// Models available on the backend
    pub async fn models(&self) -> Result<Vec<ModelInfo>> {
        Ok(self.backend.models().await?)
    }
}

/// Range checks mirroring the backend's request validation
pub fn validate(update: &SettingsUpdate) -> Result<()> {
    if let Some(t) = update.temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(Error::InvalidSetting(format!(
                "temperature must be within 0.0..=2.0, got {}",
                t
            )));
        }
    }
    if let Some(p) = update.top_p {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::InvalidSetting(format!(
                "top_p must be within 0.0..=1.0, got {}",
                p
            )));
        }
    }
    if let Some(n) = update.max_iterations {
        if !(1..=100).contains(&n) {
            return Err(Error::InvalidSetting(format!(
                "max_iterations must be within 1..=100, got {}",
                n
            )));
        }
    }
    if let Some(n) = update.max_context_tokens {
        if n == 0 {
            return Err(Error::InvalidSetting(
                "max_context_tokens must be positive".to_string(),
            ));
        }
    }
    if update.model_name.as_deref().is_some_and(|m| m.trim().is_empty()) {
        return Err(Error::InvalidSetting("model_name must not be empty".to_string()));
    }
    Ok(())
}
