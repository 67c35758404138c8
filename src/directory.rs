//! The in-memory page directory and its fallback machinery.
//!
//! The presentation layer reads and writes pages through one stable surface
//! backed by a slug-to-page map. Persistence goes through the [`PageStore`]
//! abstraction: the primary backend (the storage manager over the page
//! database) and the fallback backend (the legacy flat store) are chosen
//! when the directory is built, and the try-primary/fall-back logic lives
//! here and nowhere else. A write that fails on the primary lands in the
//! fallback and is mirrored into the map, so the UI never observes a write
//! disappearing; only exhaustion of both paths surfaces as an error.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::{
    legacy::LegacyPage,
    storage::rank_matches,
    DirectoryState, LegacyStore, Page, PageDraft, PvError, Result, StorageManager,
};

/// Abstract page persistence interface.
///
/// Handles the "where" of storage (database vs legacy flat file), while
/// [`PageDirectory`] handles the "when" (map synchronization and failover).
pub trait PageStore: Send + Sync {
    /// Persist a page under its slug and return the stored record.
    fn save_page(&self, slug: &str, draft: &PageDraft) -> Result<Page>;

    /// Look up a page; `Ok(None)` is a normal miss, not an error.
    fn get_page(&self, slug: &str) -> Result<Option<Page>>;

    /// Every page in the backend, in unspecified order.
    fn all_pages(&self) -> Result<Vec<Page>>;

    /// Remove a page; unknown slugs are a no-op.
    fn delete_page(&self, slug: &str) -> Result<()>;

    /// Ranked substring search; backends may override with something
    /// cheaper than a full scan.
    fn search_pages(&self, query: &str) -> Result<Vec<Page>> {
        Ok(rank_matches(self.all_pages()?, query))
    }
}

impl PageStore for StorageManager {
    fn save_page(&self, slug: &str, draft: &PageDraft) -> Result<Page> {
        StorageManager::save_page(self, slug, draft)?;
        StorageManager::get_page(self, slug)?.ok_or_else(|| PvError::ApplicationError {
            message: format!("page {slug} vanished between save and read-back"),
        })
    }

    fn get_page(&self, slug: &str) -> Result<Option<Page>> {
        StorageManager::get_page(self, slug)
    }

    fn all_pages(&self) -> Result<Vec<Page>> {
        StorageManager::get_all_pages(self)
    }

    fn delete_page(&self, slug: &str) -> Result<()> {
        StorageManager::delete_page(self, slug)
    }

    fn search_pages(&self, query: &str) -> Result<Vec<Page>> {
        StorageManager::search_pages(self, query)
    }
}

impl PageStore for LegacyStore {
    fn save_page(&self, slug: &str, draft: &PageDraft) -> Result<Page> {
        let mut blob = self.pages_blob()?;

        // Preserve the creation timestamp of an existing entry.
        let now = Utc::now();
        let created_at = blob
            .get(slug)
            .and_then(|entry| serde_json::from_value::<LegacyPage>(entry.clone()).ok())
            .and_then(|entry| entry.created_at)
            .unwrap_or(now);

        let entry = LegacyPage::from_draft(draft, created_at, now);
        blob.insert(slug.to_string(), serde_json::to_value(&entry)?);
        self.write_pages_blob(&blob)?;

        Ok(entry.into_page(slug))
    }

    fn get_page(&self, slug: &str) -> Result<Option<Page>> {
        let blob = self.pages_blob()?;
        let Some(entry) = blob.get(slug) else {
            return Ok(None);
        };
        match serde_json::from_value::<LegacyPage>(entry.clone()) {
            Ok(entry) => Ok(Some(entry.into_page(slug))),
            Err(e) => {
                warn!("Unreadable legacy entry for {}: {}", slug, e);
                Ok(None)
            }
        }
    }

    fn all_pages(&self) -> Result<Vec<Page>> {
        let blob = self.pages_blob()?;
        let mut pages = Vec::with_capacity(blob.len());
        for (slug, entry) in blob {
            match serde_json::from_value::<LegacyPage>(entry) {
                Ok(entry) => pages.push(entry.into_page(&slug)),
                Err(e) => warn!("Skipping unreadable legacy entry {}: {}", slug, e),
            }
        }
        Ok(pages)
    }

    fn delete_page(&self, slug: &str) -> Result<()> {
        let mut blob = self.pages_blob()?;
        if blob.remove(slug).is_some() {
            self.write_pages_blob(&blob)?;
        }
        Ok(())
    }
}

/// Keeps a slug-to-page map synchronized with the primary store, degrading
/// to the fallback store when the primary fails.
pub struct PageDirectory {
    primary: Arc<dyn PageStore>,
    fallback: Arc<dyn PageStore>,
    pages: Mutex<HashMap<String, Page>>,
    state: Mutex<DirectoryState>,
    last_error: Mutex<Option<String>>,
}

impl PageDirectory {
    /// Builds a directory over the two backends. Nothing is loaded until
    /// [`PageDirectory::refresh`].
    pub fn new(primary: Arc<dyn PageStore>, fallback: Arc<dyn PageStore>) -> Self {
        Self {
            primary,
            fallback,
            pages: Mutex::new(HashMap::new()),
            state: Mutex::new(DirectoryState::Idle),
            last_error: Mutex::new(None),
        }
    }

    /// Reloads the map from the primary store; on failure the map is
    /// repopulated from the fallback and the directory enters Degraded.
    /// Errors only when both backends fail.
    pub fn refresh(&self) -> Result<()> {
        self.set_state(DirectoryState::Loading);

        match self.primary.all_pages() {
            Ok(pages) => {
                self.replace_map(pages);
                self.set_state(DirectoryState::Ready);
                self.set_error(None);
                debug!("Directory refreshed from primary store");
                Ok(())
            }
            Err(e) => {
                warn!("Primary store failed during refresh: {}", e);
                self.set_error(Some(e.to_string()));
                let pages = self.fallback.all_pages().map_err(|fallback_err| {
                    error!("Fallback store also failed during refresh: {}", fallback_err);
                    self.set_state(DirectoryState::Degraded);
                    fallback_err
                })?;
                self.replace_map(pages);
                self.set_state(DirectoryState::Degraded);
                info!("Directory degraded to the fallback store");
                Ok(())
            }
        }
    }

    /// Saves through the primary store, falling back on failure. The saved
    /// page is mirrored into the map either way, so the write is observable
    /// immediately; an error means both paths failed.
    pub fn save_page(&self, slug: &str, draft: &PageDraft) -> Result<Page> {
        match self.primary.save_page(slug, draft) {
            Ok(page) => {
                self.insert_into_map(page.clone());
                Ok(page)
            }
            Err(e) => {
                warn!("Primary save of {} failed, using fallback: {}", slug, e);
                self.set_error(Some(e.to_string()));
                self.set_state(DirectoryState::Degraded);

                let page = self.fallback.save_page(slug, draft).map_err(|fallback_err| {
                    error!("Fallback save of {} also failed: {}", slug, fallback_err);
                    fallback_err
                })?;
                self.insert_into_map(page.clone());
                Ok(page)
            }
        }
    }

    /// Deletes through the primary store (which cascades to direct
    /// children), mirroring the removal into the map and best-effort into
    /// the fallback blob. Falls back entirely when the primary fails.
    pub fn delete_page(&self, slug: &str) -> Result<()> {
        match self.primary.delete_page(slug) {
            Ok(()) => {
                self.remove_from_map(slug, true);
                // Keep the fallback blob from resurrecting the page later.
                if let Err(e) = self.fallback.delete_page(slug) {
                    warn!("Fallback removal of {} failed: {}", slug, e);
                }
                Ok(())
            }
            Err(e) => {
                warn!("Primary delete of {} failed, using fallback: {}", slug, e);
                self.set_error(Some(e.to_string()));
                self.set_state(DirectoryState::Degraded);

                self.fallback.delete_page(slug).map_err(|fallback_err| {
                    error!("Fallback delete of {} also failed: {}", slug, fallback_err);
                    fallback_err
                })?;
                self.remove_from_map(slug, false);
                Ok(())
            }
        }
    }

    /// Resolves a page from the map, then the primary store, then the
    /// fallback, caching whatever is found. A miss everywhere is `None`;
    /// backend failures are logged, never surfaced here.
    pub fn load_page(&self, slug: &str) -> Option<Page> {
        if let Ok(pages) = self.pages.lock() {
            if let Some(page) = pages.get(slug) {
                return Some(page.clone());
            }
        }

        match self.primary.get_page(slug) {
            Ok(Some(page)) => {
                self.insert_into_map(page.clone());
                return Some(page);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Primary load of {} failed: {}", slug, e);
                self.set_error(Some(e.to_string()));
            }
        }

        match self.fallback.get_page(slug) {
            Ok(found) => {
                if let Some(page) = &found {
                    self.insert_into_map(page.clone());
                }
                found
            }
            Err(e) => {
                warn!("Fallback load of {} failed: {}", slug, e);
                None
            }
        }
    }

    /// Ranked search through the primary store, degrading to an in-memory
    /// filter over the map with the same ranking.
    pub fn search(&self, query: &str) -> Vec<Page> {
        match self.primary.search_pages(query) {
            Ok(results) => results,
            Err(e) => {
                warn!("Primary search failed, filtering in memory: {}", e);
                let pages = self
                    .pages
                    .lock()
                    .map(|map| map.values().cloned().collect::<Vec<_>>())
                    .unwrap_or_default();
                rank_matches(pages, query)
            }
        }
    }

    /// Two-level sidebar listing: visible top-level pages with their visible
    /// direct children, most recently updated first. Hidden pages stay
    /// addressable through [`PageDirectory::load_page`] but are not listed.
    pub fn sidebar_tree(&self) -> Vec<(Page, Vec<Page>)> {
        let pages: Vec<Page> = match self.pages.lock() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => return Vec::new(),
        };

        let mut tops: Vec<Page> = pages
            .iter()
            .filter(|p| !p.is_sub_page && p.parent_slug.is_none() && !p.hide_from_sidebar)
            .cloned()
            .collect();
        tops.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        tops.into_iter()
            .map(|top| {
                let mut children: Vec<Page> = pages
                    .iter()
                    .filter(|p| {
                        p.parent_slug.as_deref() == Some(top.slug.as_str()) && !p.hide_from_sidebar
                    })
                    .cloned()
                    .collect();
                children.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
                (top, children)
            })
            .collect()
    }

    /// Current synchronization state.
    pub fn state(&self) -> DirectoryState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(DirectoryState::Degraded)
    }

    /// The last recorded primary-store failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Number of pages currently mapped.
    pub fn len(&self) -> usize {
        self.pages.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn replace_map(&self, pages: Vec<Page>) {
        if let Ok(mut map) = self.pages.lock() {
            map.clear();
            map.reserve(pages.len());
            for page in pages {
                map.insert(page.slug.clone(), page);
            }
        }
    }

    fn insert_into_map(&self, page: Page) {
        if let Ok(mut map) = self.pages.lock() {
            map.insert(page.slug.clone(), page);
        }
    }

    fn remove_from_map(&self, slug: &str, cascade: bool) {
        if let Ok(mut map) = self.pages.lock() {
            map.remove(slug);
            if cascade {
                map.retain(|_, page| page.parent_slug.as_deref() != Some(slug));
            }
        }
    }

    fn set_state(&self, state: DirectoryState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    fn set_error(&self, error: Option<String>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = error;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use serde_json::json;
    use tempfile::TempDir;

    fn doc(text: &str) -> serde_json::Value {
        json!({
            "type": "doc",
            "content": [{
                "type": "paragraph",
                "content": [{ "type": "text", "text": text }]
            }]
        })
    }

    /// A directory whose primary database is open and healthy.
    fn healthy(dir: &TempDir) -> PageDirectory {
        let config = Config::rooted_at(dir.path());
        let storage = Arc::new(StorageManager::new(config.clone()));
        storage.open().unwrap();
        let legacy = Arc::new(LegacyStore::new(&config.legacy_path));
        PageDirectory::new(storage, legacy)
    }

    /// A directory whose primary store was never opened, so every primary
    /// operation fails and the legacy fallback carries the session.
    fn degraded(dir: &TempDir) -> PageDirectory {
        let config = Config::rooted_at(dir.path());
        let storage = Arc::new(StorageManager::new(config.clone()));
        let legacy = Arc::new(LegacyStore::new(&config.legacy_path));
        PageDirectory::new(storage, legacy)
    }

    #[test]
    fn healthy_path_reaches_ready() {
        let dir = TempDir::new().unwrap();
        let directory = healthy(&dir);

        assert_eq!(directory.state(), DirectoryState::Idle);
        directory.refresh().unwrap();
        assert_eq!(directory.state(), DirectoryState::Ready);
        assert!(directory.last_error().is_none());

        directory
            .save_page("home", &PageDraft::new("Home", doc("hi")))
            .unwrap();
        assert_eq!(directory.load_page("home").unwrap().title, "Home");

        directory.delete_page("home").unwrap();
        assert!(directory.load_page("home").is_none());
        assert_eq!(directory.state(), DirectoryState::Ready);
    }

    #[test]
    fn save_then_load_is_consistent_when_the_primary_is_down() {
        let dir = TempDir::new().unwrap();
        let directory = degraded(&dir);

        let saved = directory
            .save_page("offline", &PageDraft::new("Offline", doc("fallback write")))
            .unwrap();
        assert_eq!(saved.title, "Offline");

        // The write is immediately observable and sourced from the fallback.
        let loaded = directory.load_page("offline").unwrap();
        assert_eq!(loaded.title, "Offline");
        assert_eq!(loaded.text(), "fallback write");

        assert_eq!(directory.state(), DirectoryState::Degraded);
        assert!(directory.last_error().is_some());
    }

    #[test]
    fn fallback_writes_survive_a_fresh_directory() {
        let dir = TempDir::new().unwrap();
        {
            let directory = degraded(&dir);
            directory
                .save_page("persistent", &PageDraft::new("Persistent", doc("kept")))
                .unwrap();
        }

        // A fresh session over the same profile still finds the page.
        let directory = degraded(&dir);
        directory.refresh().unwrap();
        assert_eq!(directory.state(), DirectoryState::Degraded);
        assert_eq!(directory.load_page("persistent").unwrap().title, "Persistent");
    }

    #[test]
    fn refresh_degrades_and_records_the_error() {
        let dir = TempDir::new().unwrap();

        // Seed the legacy blob the way the prior scheme stored it.
        let legacy = LegacyStore::new(dir.path().join("legacy-store.json"));
        PageStore::save_page(&legacy, "old-page", &PageDraft::new("Old", doc("legacy"))).unwrap();
        drop(legacy);

        let directory = degraded(&dir);
        directory.refresh().unwrap();

        assert_eq!(directory.state(), DirectoryState::Degraded);
        assert!(directory.last_error().is_some());
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.load_page("old-page").unwrap().title, "Old");
    }

    #[test]
    fn delete_falls_back_to_the_legacy_blob() {
        let dir = TempDir::new().unwrap();
        let directory = degraded(&dir);

        directory
            .save_page("doomed", &PageDraft::new("Doomed", doc("x")))
            .unwrap();
        directory.delete_page("doomed").unwrap();

        assert!(directory.load_page("doomed").is_none());

        // The blob itself no longer holds the page.
        let legacy = LegacyStore::new(dir.path().join("legacy-store.json"));
        assert!(PageStore::get_page(&legacy, "doomed").unwrap().is_none());
    }

    #[test]
    fn search_degrades_to_the_in_memory_map() {
        let dir = TempDir::new().unwrap();
        let directory = degraded(&dir);

        directory
            .save_page("a", &PageDraft::new("Apple", doc("crisp")))
            .unwrap();
        directory
            .save_page("b", &PageDraft::new("Banana", doc("apple pie")))
            .unwrap();

        let results = directory.search("apple");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Apple");
    }

    #[test]
    fn sidebar_tree_lists_two_visible_levels() {
        let dir = TempDir::new().unwrap();
        let directory = healthy(&dir);

        directory
            .save_page("top", &PageDraft::new("Top", doc("t")))
            .unwrap();

        let mut child = PageDraft::new("Child", doc("c"));
        child.parent_slug = Some("top".to_string());
        child.is_sub_page = true;
        directory.save_page("child", &child).unwrap();

        let mut hidden = PageDraft::new("Hidden", doc("h"));
        hidden.hide_from_sidebar = true;
        directory.save_page("hidden", &hidden).unwrap();

        let tree = directory.sidebar_tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].0.slug, "top");
        assert_eq!(tree[0].1.len(), 1);
        assert_eq!(tree[0].1[0].slug, "child");

        // Hidden pages are unlisted but still addressable.
        assert!(directory.load_page("hidden").is_some());
    }
}
