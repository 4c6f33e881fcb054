#![cfg(not(target_arch = "wasm32"))]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::settings::EditorSettings;
use crate::state::State;
use crate::storage::{PersistenceError, Storage};
use crate::store::Store;

const LOCAL_FILE: &str = "local_storage.json";
const SESSION_FILE: &str = "session_storage.json";
const SETTINGS_FILE: &str = "settings.json";

/// Key/value storage kept in one JSON object on disk. Every write
/// rewrites the file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStorage {
    /// Open the file at `path`; a missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<(), PersistenceError> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.entries.insert(key.to_string(), value.to_string());
        self.save()
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistenceError> {
        if self.entries.remove(key).is_some() {
            self.save()?;
        }
        Ok(())
    }
}

/// Read editor settings; missing fields take their defaults and a missing
/// file gives the default settings.
pub fn load_settings(path: &Path) -> Result<EditorSettings, PersistenceError> {
    if !path.exists() {
        return Ok(EditorSettings::default());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

pub fn save_settings(
    path: &Path,
    settings: &EditorSettings,
) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Editor session whose local and session storage live as JSON files in
/// `dir`, with settings read from `dir/settings.json`.
pub fn open_session(dir: &Path) -> Result<State, PersistenceError> {
    let settings = load_settings(&dir.join(SETTINGS_FILE))?;
    let local = FileStorage::open(dir.join(LOCAL_FILE));
    let session = FileStorage::open(dir.join(SESSION_FILE));
    Ok(State::new(Store::new(
        settings,
        Box::new(local),
        Box::new(session),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;

    #[test]
    fn test_file_storage_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut storage = FileStorage::open(&path);
        assert_eq!(storage.get("k"), None);
        storage.set("k", "v").unwrap();
        storage.set("other", "w").unwrap();
        storage.remove("other").unwrap();

        let reopened = FileStorage::open(&path);
        assert_eq!(reopened.get("k").as_deref(), Some("v"));
        assert_eq!(reopened.get("other"), None);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(FileStorage::open(&path).get("k"), None);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path().join("nope/store.json"));
        assert!(matches!(
            storage.set("k", "v"),
            Err(PersistenceError::Io(_))
        ));
        assert_eq!(storage.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        assert_eq!(load_settings(&path).unwrap(), EditorSettings::default());

        let mut settings = EditorSettings::default();
        settings.remember_controls = false;
        settings.layout.layered.margin = 80.0;
        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);

        std::fs::write(&path, r#"{"keep_local_draft": false}"#).unwrap();
        let partial = load_settings(&path).unwrap();
        assert!(!partial.keep_local_draft);
        assert!(partial.remember_controls);
    }

    #[test]
    fn test_session_layout_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let spec: crate::controls::UiSpec =
            serde_json::from_value(serde_json::json!({
                "version": "1",
                "title": "t",
                "controls": [],
                "outputs": [],
                "modules": ["a"],
            }))
            .unwrap();

        let mut state = open_session(dir.path()).unwrap();
        state.dispatch(Action::SetSpec { spec: spec.clone() });
        state.flush();
        let placed = state.view().nodes[0].position;
        assert!(!placed.is_origin());

        let mut reopened = open_session(dir.path()).unwrap();
        reopened.dispatch(Action::SetSpec { spec });
        reopened.flush();
        assert_eq!(reopened.view().nodes[0].position, placed);
        assert_eq!(reopened.store.graph_builds(), 1);
    }
}
