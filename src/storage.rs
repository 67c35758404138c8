//! Single point of truth for page and setting persistence.
//!
//! `StorageManager` wraps the persistent database and owns everything the
//! record layer should not know about: derived-field computation on every
//! save, parent resolution, cascade deletes, and ranked search. Errors
//! propagate to the caller; falling back to the legacy store is the page
//! directory's job.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use log::{debug, error, info};
use serde_json::Value;

use crate::{content, Config, Page, PageDatabase, PageDraft, PvError, Result, StorageInfo};

/// Manages the storage, retrieval, and search of pages and settings.
pub struct StorageManager {
    /// Application configuration
    config: Config,

    /// The persistent page database
    db: PageDatabase,
}

impl StorageManager {
    /// Creates a manager over a database rooted at the configured data
    /// directory. The database stays closed until [`StorageManager::open`].
    pub fn new(config: Config) -> Self {
        let db = PageDatabase::new(&config.data_dir);
        Self { config, db }
    }

    /// Opens the underlying database. Idempotent; failures are the caller's
    /// cue to degrade to the fallback path.
    pub fn open(&self) -> Result<()> {
        self.db.open()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Saves a page under its unique slug and returns the record id.
    ///
    /// Updates preserve the original `created_at`; inserts stamp both
    /// timestamps with now. The plain-text and HTML projections are always
    /// recomputed from the draft content, never carried over. A parent that
    /// does not exist yet is tolerated; a parent chain that loops back to
    /// this page is rejected.
    pub fn save_page(&self, slug: &str, draft: &PageDraft) -> Result<u64> {
        info!("Saving page: {}", slug);

        self.check_parent_chain(slug, draft.parent_slug.as_deref())?;

        let existing = self.db.get_page_by_slug(slug)?;
        let now = Utc::now();

        let parent_id = match draft.parent_slug.as_deref() {
            Some(parent) => self.db.resolve_slug(parent)?,
            None => None,
        };

        let mut page = Page {
            id: existing.as_ref().and_then(|p| p.id),
            slug: slug.to_string(),
            title: draft.title.clone(),
            content: draft.content.clone(),
            text_content: Some(content::extract_text(&draft.content)),
            html_content: Some(content::render_html(&draft.content)),
            parent_id,
            parent_slug: draft.parent_slug.clone(),
            is_sub_page: draft.is_sub_page,
            hide_from_sidebar: draft.hide_from_sidebar,
            tags: draft.tags.clone(),
            created_at: existing.as_ref().map(|p| p.created_at).unwrap_or(now),
            updated_at: now,
        };

        let id = self.db.put_page(&mut page).map_err(|e| {
            error!("Failed to store page {}: {}", slug, e);
            e
        })?;

        debug!("Page {} saved as record {}", slug, id);
        Ok(id)
    }

    /// Looks up a page by slug. Not-found is a normal outcome, not an error.
    /// The cached parent id is recomputed from the parent slug on the way
    /// out so a recreated parent never leaves a stale pointer behind.
    pub fn get_page(&self, slug: &str) -> Result<Option<Page>> {
        let Some(mut page) = self.db.get_page_by_slug(slug)? else {
            debug!("Page not found: {}", slug);
            return Ok(None);
        };

        page.parent_id = match page.parent_slug.as_deref() {
            Some(parent) => self.db.resolve_slug(parent)?,
            None => None,
        };
        Ok(Some(page))
    }

    /// Full collection scan; ordering is imposed by consumers.
    pub fn get_all_pages(&self) -> Result<Vec<Page>> {
        let mut pages = self.db.all_pages()?;

        // Recompute the cached parent pointers against the records actually
        // present in this scan.
        let ids_by_slug: HashMap<String, u64> = pages
            .iter()
            .filter_map(|p| p.id.map(|id| (p.slug.clone(), id)))
            .collect();
        for page in &mut pages {
            page.parent_id = page
                .parent_slug
                .as_deref()
                .and_then(|parent| ids_by_slug.get(parent).copied());
        }

        Ok(pages)
    }

    /// Deletes a page and its direct children (one level, not recursive).
    ///
    /// The page and children are removed as one journaled batch, so an
    /// interruption converges at the next open instead of orphaning records.
    /// An unknown slug is a silent no-op.
    pub fn delete_page(&self, slug: &str) -> Result<()> {
        let Some(id) = self.db.resolve_slug(slug)? else {
            debug!("Delete of unknown page {} ignored", slug);
            return Ok(());
        };

        info!("Deleting page {} and its direct sub-pages", slug);

        let mut doomed: Vec<u64> = self
            .db
            .all_pages()?
            .into_iter()
            .filter(|p| p.parent_slug.as_deref() == Some(slug))
            .filter_map(|p| p.id)
            .collect();
        doomed.push(id);

        self.db.delete_pages(&doomed).map_err(|e| {
            error!("Failed to delete page {}: {}", slug, e);
            e
        })?;

        debug!("Deleted {} record(s) for page {}", doomed.len(), slug);
        Ok(())
    }

    /// Case-insensitive substring search over titles and extracted text.
    ///
    /// Title matches rank before content-only matches; within each group the
    /// most recently updated page comes first.
    pub fn search_pages(&self, query: &str) -> Result<Vec<Page>> {
        let results = rank_matches(self.get_all_pages()?, query);
        debug!("Search '{}' matched {} pages", query, results.len());
        Ok(results)
    }

    /// Upserts a setting keyed by string; the value is an opaque payload.
    pub fn save_setting(&self, key: &str, value: Value) -> Result<()> {
        self.db.put_setting(key, value)
    }

    /// Looks up a setting; a miss is a normal outcome.
    pub fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        self.db.get_setting(key)
    }

    /// The whole settings collection, for export.
    pub fn all_settings(&self) -> Result<serde_json::Map<String, Value>> {
        self.db.all_settings()
    }

    /// Collection size and host storage capacity where available.
    pub fn storage_info(&self) -> Result<StorageInfo> {
        self.db.storage_info()
    }

    /// Rejects a parent chain that loops back to the page being saved.
    /// Missing ancestors end the walk; they are tolerated, not errors.
    fn check_parent_chain(&self, slug: &str, parent_slug: Option<&str>) -> Result<()> {
        let mut visited = HashSet::new();
        let mut current = parent_slug.map(str::to_string);

        while let Some(ancestor) = current {
            if ancestor == slug {
                error!("Rejecting save of {}: parent chain loops back to it", slug);
                return Err(PvError::InvalidParent {
                    slug: slug.to_string(),
                    message: format!("ancestor chain through {} returns to the page", ancestor),
                });
            }
            if !visited.insert(ancestor.clone()) {
                // A pre-existing loop that does not involve this page; stop
                // walking rather than spinning.
                break;
            }
            current = self
                .db
                .get_page_by_slug(&ancestor)?
                .and_then(|p| p.parent_slug);
        }

        Ok(())
    }
}

/// Case-insensitive substring filter and ranking shared by every search
/// surface: title matches first, then content-only matches, most recently
/// updated first within each group.
pub(crate) fn rank_matches(pages: Vec<Page>, query: &str) -> Vec<Page> {
    let needle = query.to_lowercase();

    let mut results: Vec<Page> = pages
        .into_iter()
        .filter(|page| {
            page.title.to_lowercase().contains(&needle)
                || page.text().to_lowercase().contains(&needle)
        })
        .collect();

    results.sort_by(|a, b| {
        let a_title = a.title.to_lowercase().contains(&needle);
        let b_title = b.title.to_lowercase().contains(&needle);
        b_title
            .cmp(&a_title)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> StorageManager {
        let manager = StorageManager::new(Config::rooted_at(dir.path()));
        manager.open().unwrap();
        manager
    }

    fn text_doc(text: &str) -> Value {
        json!({
            "type": "doc",
            "content": [{
                "type": "paragraph",
                "content": [{ "type": "text", "text": text }]
            }]
        })
    }

    #[test]
    fn repeated_saves_keep_one_record_and_first_created_at() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        m.save_page("note", &PageDraft::new("First", text_doc("one"))).unwrap();
        let first = m.get_page("note").unwrap().unwrap();

        m.save_page("note", &PageDraft::new("Second", text_doc("two"))).unwrap();
        let second = m.get_page("note").unwrap().unwrap();

        assert_eq!(m.get_all_pages().unwrap().len(), 1);
        assert_eq!(second.title, "Second");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn derived_fields_reflect_only_the_latest_content() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        m.save_page("note", &PageDraft::new("Note", text_doc("old words"))).unwrap();
        m.save_page("note", &PageDraft::new("Note", text_doc("new words"))).unwrap();

        let page = m.get_page("note").unwrap().unwrap();
        assert_eq!(page.text(), "new words");
        assert!(!page.text().contains("old"));
        assert_eq!(page.html_content.as_deref(), Some("<p>new words</p>"));
    }

    #[test]
    fn missing_parent_is_tolerated_and_resolved_once_created() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        let mut draft = PageDraft::new("Child", text_doc("child"));
        draft.parent_slug = Some("parent".to_string());
        draft.is_sub_page = true;
        m.save_page("child", &draft).unwrap();

        assert_eq!(m.get_page("child").unwrap().unwrap().parent_id, None);

        let parent_id = m
            .save_page("parent", &PageDraft::new("Parent", text_doc("parent")))
            .unwrap();

        // The cached pointer is recomputed on read.
        assert_eq!(
            m.get_page("child").unwrap().unwrap().parent_id,
            Some(parent_id)
        );
    }

    #[test]
    fn cycle_back_to_the_saved_page_is_rejected() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        let mut a = PageDraft::new("A", text_doc("a"));
        a.parent_slug = Some("b".to_string());
        m.save_page("a", &a).unwrap();

        let mut b = PageDraft::new("B", text_doc("b"));
        b.parent_slug = Some("a".to_string());
        assert!(matches!(
            m.save_page("b", &b),
            Err(PvError::InvalidParent { .. })
        ));
    }

    #[test]
    fn cascade_delete_stops_at_direct_children() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        m.save_page("root", &PageDraft::new("Root", text_doc("r"))).unwrap();

        let mut child = PageDraft::new("Child", text_doc("c"));
        child.parent_slug = Some("root".to_string());
        m.save_page("child", &child).unwrap();

        let mut grandchild = PageDraft::new("Grandchild", text_doc("g"));
        grandchild.parent_slug = Some("child".to_string());
        m.save_page("grandchild", &grandchild).unwrap();

        m.delete_page("root").unwrap();

        assert!(m.get_page("root").unwrap().is_none());
        assert!(m.get_page("child").unwrap().is_none());
        assert!(m.get_page("grandchild").unwrap().is_some());
    }

    #[test]
    fn deleting_an_unknown_slug_is_a_silent_noop() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        m.delete_page("never-existed").unwrap();
    }

    #[test]
    fn title_matches_rank_before_content_matches() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        // The content-only match is saved last, so it is the most recently
        // updated; the title match must still rank first.
        m.save_page("fruit-1", &PageDraft::new("Apple", text_doc("crisp"))).unwrap();
        m.save_page("fruit-2", &PageDraft::new("Banana", text_doc("apple pie"))).unwrap();

        let results = m.search_pages("apple").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].title, "Apple");
        assert_eq!(results[1].title, "Banana");
    }

    #[test]
    fn search_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        m.save_page("note", &PageDraft::new("Shopping List", text_doc("Buy APPLES"))).unwrap();
        assert_eq!(m.search_pages("apples").unwrap().len(), 1);
        assert_eq!(m.search_pages("shopping").unwrap().len(), 1);
        assert!(m.search_pages("pears").unwrap().is_empty());
    }

    #[test]
    fn settings_roundtrip_through_the_manager() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        m.save_setting("api-config", json!({ "model": "gpt" })).unwrap();
        assert_eq!(
            m.get_setting("api-config").unwrap(),
            Some(json!({ "model": "gpt" }))
        );
        assert_eq!(m.get_setting("absent").unwrap(), None);
    }
}
