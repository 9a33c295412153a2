//! Namespaced key-value persistence for form state and the last result.
//!
//! Values are stored as JSON text under `"<prefix>_<field>"`. Reads never
//! fail: a missing or unreadable entry yields the caller's default. Writes and
//! removals log failures instead of returning them, so persistence trouble can
//! never interrupt a match run.
//!
//! ```rust
//! use school_match::storage::{self, MemoryBackend, UiState};
//!
//! let store = storage::school_matching_store(MemoryBackend::new());
//! store.set(storage::UI_STATE, &UiState { show_prompt_card: true });
//!
//! let ui: UiState = store.get(storage::UI_STATE, UiState::default());
//! assert!(ui.show_prompt_card);
//! ```

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Prefix used by the advising console
pub const SCHOOL_MATCHING_PREFIX: &str = "school_matching";

/// Last submitted [`FormData`](crate::FormData)
pub const FORM_DATA: &str = "formData";
/// Last used [`PromptData`](crate::PromptData)
pub const PROMPT_DATA: &str = "promptData";
/// Last [`MatchResult`](crate::MatchResult)
pub const MATCH_RESULT: &str = "matchResult";
/// [`UiState`] toggles
pub const UI_STATE: &str = "uiState";

/// Raw string storage underneath a [`NamespacedStore`]
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    /// Every key currently stored, in any namespace
    fn keys(&self) -> Result<Vec<String>>;
}

impl<B: KeyValueBackend + ?Sized> KeyValueBackend for &B {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }
}

impl<B: KeyValueBackend + ?Sized> KeyValueBackend for std::sync::Arc<B> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        (**self).keys()
    }
}

/// In-process map
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| Error::storage("memory backend lock poisoned"))
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries()?.keys().cloned().collect())
    }
}

/// One `<key>.json` file per entry in a directory
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    const EXTENSION: &'static str = "json";

    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            return Err(Error::storage(format!("invalid storage key {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.{}", key, Self::EXTENSION)))
    }
}

impl KeyValueBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path(key)?) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path(key)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(path, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path(key)?) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(Self::EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Usage figures for a backend, sizes counted in characters of key plus value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub total_size: usize,
    pub related_keys: Vec<String>,
    pub related_size: usize,
}

/// Typed JSON view of a backend under one key prefix
#[derive(Debug)]
pub struct NamespacedStore<B> {
    prefix: String,
    backend: B,
}

impl<B: KeyValueBackend> NamespacedStore<B> {
    pub fn new(prefix: impl Into<String>, backend: B) -> Self {
        Self {
            prefix: prefix.into(),
            backend,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Full backend key for `field`
    pub fn key(&self, field: &str) -> String {
        format!("{}_{}", self.prefix, field)
    }

    fn owns(&self, key: &str) -> bool {
        key.strip_prefix(&self.prefix)
            .is_some_and(|rest| rest.starts_with('_'))
    }

    /// Reads `field`, or returns `default` when it is absent or unreadable.
    pub fn get<T: DeserializeOwned>(&self, field: &str, default: T) -> T {
        let key = self.key(field);
        let raw = match self.backend.get(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log::debug!("storage: {} not found, using default", key);
                return default;
            }
            Err(e) => {
                log::warn!("storage: reading {} failed: {}", key, e);
                return default;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("storage: {} is corrupt ({}), using default", key, e);
                default
            }
        }
    }

    /// Writes `value` as JSON under `field`.
    pub fn set<T: Serialize + ?Sized>(&self, field: &str, value: &T) {
        let key = self.key(field);
        let outcome = serde_json::to_string(value)
            .map_err(Error::from)
            .and_then(|json| self.backend.set(&key, &json));
        match outcome {
            Ok(()) => log::debug!("storage: saved {}", key),
            Err(e) => log::warn!("storage: saving {} failed: {}", key, e),
        }
    }

    pub fn remove(&self, field: &str) {
        let key = self.key(field);
        if let Err(e) = self.backend.remove(&key) {
            log::warn!("storage: removing {} failed: {}", key, e);
        }
    }

    /// Removes every entry under this prefix and nothing else.
    pub fn clear(&self) {
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("storage: listing keys failed: {}", e);
                return;
            }
        };
        for key in keys.into_iter().filter(|key| self.owns(key)) {
            if let Err(e) = self.backend.remove(&key) {
                log::warn!("storage: removing {} failed: {}", key, e);
            }
        }
    }

    pub fn storage_info(&self) -> StorageInfo {
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("storage: listing keys failed: {}", e);
                return StorageInfo::default();
            }
        };

        let mut info = StorageInfo::default();
        for key in keys {
            let value = self.backend.get(&key).ok().flatten().unwrap_or_default();
            let size = key.chars().count() + value.chars().count();
            info.total_size += size;
            if self.owns(&key) {
                info.related_size += size;
                info.related_keys.push(key);
            }
        }
        info
    }
}

/// Store with the advising console's `school_matching` prefix
pub fn school_matching_store<B: KeyValueBackend>(backend: B) -> NamespacedStore<B> {
    NamespacedStore::new(SCHOOL_MATCHING_PREFIX, backend)
}

/// Persisted UI toggles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiState {
    pub show_prompt_card: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FormData;

    #[test]
    fn test_get_missing_returns_default() {
        let store = school_matching_store(MemoryBackend::new());
        let form: FormData = store.get(FORM_DATA, FormData::default());
        assert_eq!(form, FormData::default());
    }

    #[test]
    fn test_round_trip_under_prefixed_key() {
        let store = school_matching_store(MemoryBackend::new());
        let form = FormData {
            student_school: "武汉大学".into(),
            grade: "85".into(),
            ..Default::default()
        };
        store.set(FORM_DATA, &form);

        assert_eq!(store.key(FORM_DATA), "school_matching_formData");
        assert!(store.backend().get("school_matching_formData").unwrap().is_some());
        assert_eq!(store.get(FORM_DATA, FormData::default()), form);
    }

    #[test]
    fn test_corrupt_entry_returns_default() {
        let backend = MemoryBackend::new();
        backend.set("school_matching_uiState", "{not json").unwrap();
        let store = school_matching_store(backend);
        assert_eq!(store.get(UI_STATE, UiState::default()), UiState::default());
    }

    #[test]
    fn test_clear_only_touches_prefix() {
        let backend = MemoryBackend::new();
        backend.set("other_app_token", "\"x\"").unwrap();
        backend.set("school_matchingX", "\"not ours\"").unwrap();
        let store = school_matching_store(backend);
        store.set(UI_STATE, &UiState { show_prompt_card: true });
        store.set(MATCH_RESULT, &serde_json::json!({"response": "r"}));

        store.clear();

        let keys = store.backend().keys().unwrap();
        assert_eq!(keys, vec!["other_app_token", "school_matchingX"]);
    }

    #[test]
    fn test_storage_info() {
        let backend = MemoryBackend::new();
        backend.set("k", "vv").unwrap();
        let store = NamespacedStore::new("p", backend);
        store.set("a", &1);

        let info = store.storage_info();
        assert_eq!(info.related_keys, vec!["p_a"]);
        assert_eq!(info.related_size, 3 + 1);
        assert_eq!(info.total_size, 3 + 1 + 1 + 2);
    }

    #[test]
    fn test_remove() {
        let store = school_matching_store(MemoryBackend::new());
        store.set(PROMPT_DATA, &"prompt");
        store.remove(PROMPT_DATA);
        assert_eq!(store.get(PROMPT_DATA, String::from("default")), "default");
    }

    #[test]
    fn test_file_backend_round_trip() {
        let dir = std::env::temp_dir().join(format!("school-match-store-{}", std::process::id()));
        let backend = FileBackend::new(&dir);
        assert!(backend.keys().unwrap().is_empty());

        let store = school_matching_store(backend);
        store.set(UI_STATE, &UiState { show_prompt_card: true });
        assert!(store.get(UI_STATE, UiState::default()).show_prompt_card);
        assert_eq!(store.storage_info().related_keys, vec!["school_matching_uiState"]);

        store.clear();
        assert!(store.backend().keys().unwrap().is_empty());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_file_backend_rejects_path_keys() {
        let backend = FileBackend::new(std::env::temp_dir());
        assert!(matches!(backend.set("../escape", "1"), Err(Error::Storage(_))));
        assert!(backend.get("a/b").is_err());
    }
}
