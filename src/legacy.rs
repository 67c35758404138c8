//! The legacy flat key-value store.
//!
//! The prior storage scheme kept everything in a flat string-to-string map:
//! all pages as one serialized JSON blob under a single key, plus a handful
//! of well-known keys for the current document, API configuration, background
//! and sidebar state. This module models that map as a single JSON file with
//! an in-memory mirror and atomic write-through. It is both the migration
//! source and the fallback backend when the page database is unavailable.

use std::{collections::HashMap, path::PathBuf, sync::Mutex};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    content,
    database::{atomic_write_json, read_json},
    Page, PageDraft, PvError, Result,
};

/// Pages blob: slug to legacy page record.
pub const KEY_PAGES: &str = "novel-pages";
/// Single-slot current document.
pub const KEY_CONTENT: &str = "novel-content";
pub const KEY_API_CONFIG: &str = "novel-api-config";
pub const KEY_BACKGROUND_IMAGE: &str = "novel-background-image";
/// Numeric string.
pub const KEY_BACKGROUND_OPACITY: &str = "novel-background-opacity";
/// JSON array of collapsed page slugs.
pub const KEY_COLLAPSED_PAGES: &str = "novel-collapsed-pages";
/// Completion marker: `"true"` once the one-time migration has run.
pub const KEY_MIGRATED: &str = "indexeddb-migrated";
pub const KEY_BACKUP: &str = "novel-localStorage-backup";
pub const KEY_BACKUP_DATE: &str = "novel-localStorage-backup-date";
pub const KEY_HTML_CONTENT: &str = "html-content";
pub const KEY_MARKDOWN: &str = "markdown";

/// One page record inside the legacy pages blob.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_slug: Option<String>,
    #[serde(default)]
    pub is_sub_page: bool,
    #[serde(default)]
    pub hide_from_sidebar: bool,
}

impl LegacyPage {
    /// Builds a blob entry from a save payload, preserving the original
    /// creation timestamp where one exists.
    pub fn from_draft(draft: &PageDraft, created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            title: Some(draft.title.clone()),
            content: Some(draft.content.clone()),
            created_at: Some(created_at),
            updated_at: Some(now),
            parent_slug: draft.parent_slug.clone(),
            is_sub_page: draft.is_sub_page,
            hide_from_sidebar: draft.hide_from_sidebar,
        }
    }

    /// Lifts a blob entry into the full page model, filling defaults and
    /// computing the projections the legacy scheme never stored.
    pub fn into_page(self, slug: &str) -> Page {
        let now = Utc::now();
        let content = self.content.unwrap_or_else(content::empty_document);
        Page {
            id: None,
            slug: slug.to_string(),
            title: self.title.unwrap_or_else(|| "Untitled".to_string()),
            text_content: Some(content::extract_text(&content)),
            html_content: Some(content::render_html(&content)),
            content,
            parent_id: None,
            parent_slug: self.parent_slug,
            is_sub_page: self.is_sub_page,
            hide_from_sidebar: self.hide_from_sidebar,
            tags: Vec::new(),
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
        }
    }
}

/// The flat string-to-string store backing file.
pub struct LegacyStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl LegacyStore {
    /// Loads the store file; a missing file is an empty store, an unreadable
    /// one is logged and treated as empty.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_json::<HashMap<String, String>>(&path) {
            Ok(Some(map)) => map,
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("Legacy store {} unreadable, starting empty: {}", path.display(), e);
                HashMap::new()
            }
        };
        debug!(
            "Legacy store loaded from {} with {} keys",
            path.display(),
            entries.len()
        );
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get_item(key).is_some()
    }

    pub fn set_item(&self, key: &str, value: impl Into<String>) -> Result<()> {
        let mut entries = self.lock_entries()?;
        entries.insert(key.to_string(), value.into());
        atomic_write_json(&self.path, &*entries)
    }

    pub fn remove_item(&self, key: &str) -> Result<()> {
        let mut entries = self.lock_entries()?;
        if entries.remove(key).is_some() {
            atomic_write_json(&self.path, &*entries)?;
        }
        Ok(())
    }

    /// Parses the pages blob; a missing key is an empty map.
    pub fn pages_blob(&self) -> Result<serde_json::Map<String, Value>> {
        match self.get_item(KEY_PAGES) {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(serde_json::Map::new()),
        }
    }

    pub fn write_pages_blob(&self, blob: &serde_json::Map<String, Value>) -> Result<()> {
        self.set_item(KEY_PAGES, serde_json::to_string(blob)?)
    }

    fn lock_entries(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(|_| PvError::LockAcquisitionFailed {
            message: "Failed to acquire lock on legacy store entries".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_an_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = LegacyStore::new(dir.path().join("legacy.json"));
        assert_eq!(store.get_item(KEY_PAGES), None);
        assert!(!store.contains(KEY_MIGRATED));
    }

    #[test]
    fn items_survive_a_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.json");

        let store = LegacyStore::new(&path);
        store.set_item(KEY_MIGRATED, "true").unwrap();
        store.set_item(KEY_BACKGROUND_OPACITY, "0.5").unwrap();
        store.remove_item(KEY_BACKGROUND_OPACITY).unwrap();

        let reloaded = LegacyStore::new(&path);
        assert_eq!(reloaded.get_item(KEY_MIGRATED).as_deref(), Some("true"));
        assert_eq!(reloaded.get_item(KEY_BACKGROUND_OPACITY), None);
    }

    #[test]
    fn pages_blob_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = LegacyStore::new(dir.path().join("legacy.json"));

        let mut blob = serde_json::Map::new();
        blob.insert(
            "welcome".to_string(),
            json!({ "title": "Welcome", "isSubPage": false }),
        );
        store.write_pages_blob(&blob).unwrap();

        let loaded = store.pages_blob().unwrap();
        assert_eq!(loaded.len(), 1);
        let page: LegacyPage =
            serde_json::from_value(loaded.get("welcome").unwrap().clone()).unwrap();
        assert_eq!(page.title.as_deref(), Some("Welcome"));
    }

    #[test]
    fn blob_entries_lift_into_pages_with_defaults() {
        let entry = LegacyPage {
            content: Some(json!({
                "type": "doc",
                "content": [{
                    "type": "paragraph",
                    "content": [{ "type": "text", "text": "hello" }]
                }]
            })),
            ..LegacyPage::default()
        };

        let page = entry.into_page("greeting");
        assert_eq!(page.slug, "greeting");
        assert_eq!(page.title, "Untitled");
        assert_eq!(page.text(), "hello");
        assert!(page.id.is_none());
    }
}
