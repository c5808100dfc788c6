//! Per-user settings storage
//!
//! Settings are a small keyed document per user. Absent users get the
//! default, which selects the Google Cloud Vision provider.

use crate::error::AppError;
use crate::providers;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Which service extracts text from a user's uploads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionApi {
    #[default]
    #[serde(rename = "Vision API")]
    VisionApi,
    #[serde(rename = "OpenAI API")]
    OpenAiApi,
}

impl ExtractionApi {
    /// Name of the provider in the registry
    pub fn provider_name(self) -> &'static str {
        match self {
            Self::VisionApi => providers::vision::NAME,
            Self::OpenAiApi => providers::openai::NAME,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub text_extraction_api: ExtractionApi,
}

pub trait SettingsStore: Send + Sync {
    /// Settings for `user_id`, or the default when none were saved
    fn load_config(&self, user_id: &str) -> Result<UserSettings, AppError>;

    /// Insert or replace the settings for `user_id`
    fn save_config(&self, user_id: &str, settings: &UserSettings) -> Result<(), AppError>;
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, AppError> {
    mutex
        .lock()
        .map_err(|_| AppError::Settings("settings lock poisoned".to_string()))
}

/// Settings kept for the lifetime of the process only
#[derive(Default)]
pub struct MemorySettingsStore {
    entries: Mutex<BTreeMap<String, UserSettings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load_config(&self, user_id: &str) -> Result<UserSettings, AppError> {
        Ok(lock(&self.entries)?.get(user_id).cloned().unwrap_or_default())
    }

    fn save_config(&self, user_id: &str, settings: &UserSettings) -> Result<(), AppError> {
        lock(&self.entries)?.insert(user_id.to_string(), settings.clone());
        Ok(())
    }
}

/// Settings persisted as one JSON object keyed by user id
pub struct FileSettingsStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, UserSettings>>,
}

impl FileSettingsStore {
    /// Open the store, reading existing entries if the file is present
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| {
                AppError::Settings(format!("Failed to read {}: {}", path.display(), e))
            })?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| {
                    AppError::Settings(format!("Failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            BTreeMap::new()
        };

        tracing::info!(
            path = %path.display(),
            users = entries.len(),
            "Settings store opened"
        );

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// `<config dir>/essay-ocr-server/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("essay-ocr-server").join("settings.json"))
    }

    // Write to a sibling temp file, then rename over the target
    fn persist(&self, entries: &BTreeMap<String, UserSettings>) -> Result<(), AppError> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Settings(format!("Failed to create {}: {}", dir.display(), e)))?;

        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| AppError::Settings(format!("Failed to serialize settings: {}", e)))?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| AppError::Settings(format!("Failed to create temp file: {}", e)))?;
        temp.write_all(&json)
            .map_err(|e| AppError::Settings(format!("Failed to write settings: {}", e)))?;
        temp.persist(&self.path).map_err(|e| {
            AppError::Settings(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn load_config(&self, user_id: &str) -> Result<UserSettings, AppError> {
        Ok(lock(&self.entries)?.get(user_id).cloned().unwrap_or_default())
    }

    fn save_config(&self, user_id: &str, settings: &UserSettings) -> Result<(), AppError> {
        let mut entries = lock(&self.entries)?;
        let previous = entries.insert(user_id.to_string(), settings.clone());

        if let Err(e) = self.persist(&entries) {
            // Keep memory in step with what is on disk
            match previous {
                Some(old) => entries.insert(user_id.to_string(), old),
                None => entries.remove(user_id),
            };
            return Err(e);
        }

        tracing::debug!(user_id, "Settings saved");
        Ok(())
    }
}
