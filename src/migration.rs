//! One-time migration from the legacy flat store, plus corpus-level
//! backup, restore, import and export.
//!
//! Migration is best-effort: every legacy item is transferred individually,
//! failures are collected into the report instead of aborting the run, and
//! the completion marker is set unconditionally at the end so the transfer
//! happens at most once per profile.

use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::Value;
use walkdir::WalkDir;
use zip::{write::FileOptions, ZipArchive, ZipWriter};

use crate::{
    legacy::{
        LegacyPage, LegacyStore, KEY_API_CONFIG, KEY_BACKGROUND_IMAGE, KEY_BACKGROUND_OPACITY,
        KEY_BACKUP, KEY_BACKUP_DATE, KEY_COLLAPSED_PAGES, KEY_CONTENT, KEY_HTML_CONTENT,
        KEY_MARKDOWN, KEY_MIGRATED, KEY_PAGES,
    },
    ExportBundle, ImportReport, MigrationReport, Page, PageDraft, PvError, RestoreArchiveSummary,
    Result, StorageManager,
};

/// Slug the legacy single-slot current document is migrated to.
const CURRENT_DOCUMENT_SLUG: &str = "index";
const CURRENT_DOCUMENT_TITLE: &str = "Home";

/// Bundle format version stamped into exports.
const EXPORT_VERSION: &str = "1.0.0";

const ARCHIVE_PREFIX: &str = "pagevault_backup_";
const ARCHIVE_SETTINGS_ENTRY: &str = "settings.json";

/// Transfers legacy data into the persistent store and owns corpus-level
/// backup and restore.
pub struct MigrationEngine {
    storage: Arc<StorageManager>,
    legacy: Arc<LegacyStore>,
}

impl MigrationEngine {
    pub fn new(storage: Arc<StorageManager>, legacy: Arc<LegacyStore>) -> Self {
        Self { storage, legacy }
    }

    /// Application-start entry point: opens the persistent store and runs
    /// the one-time migration when it is still pending. Returns the report
    /// when a migration actually ran.
    pub fn initialize(&self) -> Result<Option<MigrationReport>> {
        self.storage.open()?;

        if !self.needs_migration() {
            return Ok(None);
        }

        info!("Legacy data detected, starting one-time migration");
        Ok(Some(self.migrate()))
    }

    /// True iff legacy page data exists and the completion marker is absent.
    /// Cheap and side-effect-free; safe to call on every start.
    pub fn needs_migration(&self) -> bool {
        let has_pages = self.legacy.contains(KEY_PAGES);
        let has_content = self.legacy.contains(KEY_CONTENT);
        let migrated = self.legacy.get_item(KEY_MIGRATED).as_deref() == Some("true");
        (has_pages || has_content) && !migrated
    }

    /// Runs the migration. Per-item failures land in the report's error
    /// list and never abort the remaining steps; the completion marker is
    /// set regardless, so failed items are not retried automatically.
    pub fn migrate(&self) -> MigrationReport {
        if !self.needs_migration() {
            debug!("Migration already completed or nothing to migrate");
            return MigrationReport {
                success: true,
                migrated_pages: 0,
                errors: Vec::new(),
            };
        }

        info!("Starting data migration from the legacy store");
        let mut errors = Vec::new();
        let mut migrated_pages = 0;

        // 1. The pages blob, one save per entry.
        if let Some(raw) = self.legacy.get_item(KEY_PAGES) {
            match serde_json::from_str::<serde_json::Map<String, Value>>(&raw) {
                Ok(entries) => {
                    for (slug, entry) in entries {
                        match self.migrate_page_entry(&slug, entry) {
                            Ok(()) => migrated_pages += 1,
                            Err(e) => errors.push(format!("Failed to migrate page {slug}: {e}")),
                        }
                    }
                }
                Err(e) => errors.push(format!("Failed to parse pages data: {e}")),
            }
        }

        // 2. The current-document slot, mapped to its well-known slug.
        if let Some(raw) = self.legacy.get_item(KEY_CONTENT) {
            match self.migrate_current_document(&raw) {
                Ok(()) => migrated_pages += 1,
                Err(e) => errors.push(format!("Failed to migrate current content: {e}")),
            }
        }

        // 3. API configuration.
        if let Some(raw) = self.legacy.get_item(KEY_API_CONFIG) {
            if let Err(e) = serde_json::from_str::<Value>(&raw)
                .map_err(PvError::from)
                .and_then(|config| self.storage.save_setting("api-config", config))
            {
                errors.push(format!("Failed to migrate API config: {e}"));
            }
        }

        // 4. Background image and opacity.
        if let Some(image) = self.legacy.get_item(KEY_BACKGROUND_IMAGE) {
            if let Err(e) = self
                .storage
                .save_setting("background-image", Value::String(image))
            {
                errors.push(format!("Failed to migrate background image: {e}"));
            }
        }
        if let Some(raw) = self.legacy.get_item(KEY_BACKGROUND_OPACITY) {
            match raw.trim().parse::<f64>() {
                Ok(opacity) => {
                    if let Err(e) = self.storage.save_setting(
                        "background-opacity",
                        serde_json::Number::from_f64(opacity)
                            .map(Value::Number)
                            .unwrap_or(Value::Null),
                    ) {
                        errors.push(format!("Failed to migrate background opacity: {e}"));
                    }
                }
                Err(e) => errors.push(format!("Failed to migrate background opacity: {e}")),
            }
        }

        // 5. Sidebar collapse state.
        if let Some(raw) = self.legacy.get_item(KEY_COLLAPSED_PAGES) {
            if let Err(e) = serde_json::from_str::<Value>(&raw)
                .map_err(PvError::from)
                .and_then(|collapsed| self.storage.save_setting("collapsed-pages", collapsed))
            {
                errors.push(format!("Failed to migrate collapsed pages: {e}"));
            }
        }

        // 6. Mark completion whatever happened above; partial failures are
        // reported, not retried.
        if let Err(e) = self.legacy.set_item(KEY_MIGRATED, "true") {
            errors.push(format!("Failed to record migration marker: {e}"));
        }

        info!(
            "Migration completed: {} pages, {} errors",
            migrated_pages,
            errors.len()
        );

        MigrationReport {
            success: errors.is_empty(),
            migrated_pages,
            errors,
        }
    }

    fn migrate_page_entry(&self, slug: &str, entry: Value) -> Result<()> {
        let legacy: LegacyPage = serde_json::from_value(entry)?;
        let draft = PageDraft {
            title: legacy.title.unwrap_or_else(|| "Untitled".to_string()),
            content: legacy.content.unwrap_or_else(crate::content::empty_document),
            parent_slug: legacy.parent_slug,
            is_sub_page: legacy.is_sub_page,
            hide_from_sidebar: legacy.hide_from_sidebar,
            tags: Vec::new(),
        };
        self.storage.save_page(slug, &draft)?;
        Ok(())
    }

    fn migrate_current_document(&self, raw: &str) -> Result<()> {
        let content: Value = serde_json::from_str(raw)?;
        let draft = PageDraft::new(CURRENT_DOCUMENT_TITLE, content);
        self.storage.save_page(CURRENT_DOCUMENT_SLUG, &draft)?;
        Ok(())
    }

    /// Removes the migrated legacy keys, optionally snapshotting them into a
    /// single timestamped backup blob first. Keys outside the enumerated set
    /// are left untouched.
    pub fn cleanup_local_storage(&self, keep_backup: bool) -> Result<()> {
        if keep_backup {
            let mut backup = serde_json::Map::new();
            for key in [
                KEY_PAGES,
                KEY_CONTENT,
                KEY_API_CONFIG,
                KEY_BACKGROUND_IMAGE,
                KEY_BACKGROUND_OPACITY,
                KEY_COLLAPSED_PAGES,
            ] {
                if let Some(value) = self.legacy.get_item(key) {
                    backup.insert(key.to_string(), Value::String(value));
                }
            }
            self.legacy
                .set_item(KEY_BACKUP, serde_json::to_string(&backup)?)?;
            self.legacy
                .set_item(KEY_BACKUP_DATE, Utc::now().to_rfc3339())?;
        }

        for key in [
            KEY_PAGES,
            KEY_CONTENT,
            KEY_HTML_CONTENT,
            KEY_MARKDOWN,
            KEY_COLLAPSED_PAGES,
        ] {
            self.legacy.remove_item(key)?;
        }

        info!("Legacy store cleaned up (backup kept: {})", keep_backup);
        Ok(())
    }

    /// Reinstates the legacy keys from the backup blob and clears the
    /// completion marker so migration is re-evaluated on the next start.
    /// Returns false when there is no usable backup.
    pub fn restore_from_backup(&self) -> bool {
        let Some(raw) = self.legacy.get_item(KEY_BACKUP) else {
            debug!("No legacy backup blob found");
            return false;
        };

        let backup: serde_json::Map<String, Value> = match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!("Legacy backup blob unreadable: {}", e);
                return false;
            }
        };

        for (key, value) in backup {
            let Some(value) = value.as_str() else { continue };
            if let Err(e) = self.legacy.set_item(&key, value) {
                warn!("Failed to restore legacy key {}: {}", key, e);
                return false;
            }
        }

        if let Err(e) = self.legacy.remove_item(KEY_MIGRATED) {
            warn!("Failed to clear migration marker: {}", e);
            return false;
        }

        info!("Legacy backup restored");
        true
    }

    /// Full-corpus JSON snapshot of pages and settings. Record identifiers
    /// are stripped so an import assigns fresh ones.
    pub fn export_all_data(&self) -> Result<ExportBundle> {
        let mut pages = self.storage.get_all_pages()?;
        for page in &mut pages {
            page.id = None;
            page.parent_id = None;
        }

        Ok(ExportBundle {
            version: EXPORT_VERSION.to_string(),
            export_date: Utc::now().to_rfc3339(),
            pages,
            settings: self.storage.all_settings()?,
        })
    }

    /// Imports a snapshot with the same per-item best-effort semantics as
    /// migration. A bundle without a pages array is a format error.
    pub fn import_data(&self, data: &Value) -> ImportReport {
        let mut errors = Vec::new();
        let mut imported_pages = 0;

        let Some(pages) = data.get("pages").and_then(Value::as_array) else {
            return ImportReport {
                success: false,
                imported_pages: 0,
                errors: vec!["Invalid data format: pages array not found".to_string()],
            };
        };

        for entry in pages {
            let Some(slug) = entry.get("slug").and_then(Value::as_str) else {
                errors.push("Failed to import page: record has no slug".to_string());
                continue;
            };
            match self.migrate_page_entry(slug, entry.clone()) {
                Ok(()) => imported_pages += 1,
                Err(e) => errors.push(format!("Failed to import page {slug}: {e}")),
            }
        }

        if let Some(settings) = data.get("settings").and_then(Value::as_object) {
            for (key, value) in settings {
                if let Err(e) = self.storage.save_setting(key, value.clone()) {
                    errors.push(format!("Failed to import setting {key}: {e}"));
                }
            }
        }

        info!(
            "Import completed: {} pages, {} errors",
            imported_pages,
            errors.len()
        );

        ImportReport {
            success: errors.is_empty(),
            imported_pages,
            errors,
        }
    }

    /// Writes a timestamped ZIP archive of every page record plus the
    /// settings collection and prunes archives beyond the configured limit.
    pub fn create_archive_backup(&self) -> Result<PathBuf> {
        let backup_dir = &self.storage.config().backup_dir;
        if !backup_dir.exists() {
            fs::create_dir_all(backup_dir).map_err(|e| PvError::BackupFailed {
                message: e.to_string(),
            })?;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let archive_path = backup_dir.join(format!("{ARCHIVE_PREFIX}{timestamp}.zip"));

        let file = File::create(&archive_path).map_err(|e| PvError::BackupFailed {
            message: e.to_string(),
        })?;
        let mut archive = ZipWriter::new(file);

        let pages = self.storage.get_all_pages()?;
        let page_count = pages.len();

        for page in &pages {
            let options = FileOptions::<zip::write::ExtendedFileOptions>::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .unix_permissions(0o644);

            let record_json = serde_json::to_string_pretty(page)?;
            let entry_name = format!("pages/{}.json", page.id.unwrap_or_default());

            archive.start_file(entry_name, options)?;
            archive
                .write_all(record_json.as_bytes())
                .map_err(|e| PvError::BackupFailed {
                    message: format!("Failed to write page {} to archive: {}", page.slug, e),
                })?;
        }

        let options = FileOptions::<zip::write::ExtendedFileOptions>::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);
        archive.start_file(ARCHIVE_SETTINGS_ENTRY, options)?;
        archive
            .write_all(serde_json::to_string_pretty(&self.storage.all_settings()?)?.as_bytes())
            .map_err(|e| PvError::BackupFailed {
                message: format!("Failed to write settings to archive: {}", e),
            })?;

        archive.finish()?;

        self.cleanup_old_archives()?;

        info!(
            "Archive backup created with {} pages at {}",
            page_count,
            archive_path.display()
        );
        Ok(archive_path)
    }

    /// Restores pages and settings from an archive created by
    /// [`MigrationEngine::create_archive_backup`].
    ///
    /// # Arguments
    ///
    /// * `archive_path` - Path to the archive file to restore from
    /// * `overwrite_existing` - Whether to overwrite existing pages or preserve them
    ///
    /// # Returns
    ///
    /// A summary of the restoration process in case of success or an error
    pub fn restore_archive_backup(
        &self,
        archive_path: &Path,
        overwrite_existing: bool,
    ) -> Result<RestoreArchiveSummary> {
        if !archive_path.is_file() {
            return Err(PvError::RestoreFailed {
                message: format!("Archive not found: {}", archive_path.display()),
            });
        }
        if archive_path.extension().is_none_or(|ext| ext != "zip") {
            return Err(PvError::RestoreFailed {
                message: format!("Not a valid ZIP archive: {}", archive_path.display()),
            });
        }

        let file = File::open(archive_path).map_err(|e| PvError::RestoreFailed {
            message: format!("Failed to open archive: {e}"),
        })?;
        let mut archive = ZipArchive::new(file)?;

        // First pass: collect page entry names.
        let mut entry_names = Vec::new();
        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            if name.starts_with("pages/") && name.ends_with(".json") {
                entry_names.push(name);
            }
        }

        let existing: std::collections::HashSet<String> = self
            .storage
            .get_all_pages()?
            .into_iter()
            .map(|p| p.slug)
            .collect();

        let mut pages_restored = 0;
        let mut pages_skipped = 0;
        let mut failed_pages = Vec::new();

        // Second pass: restore each record through the normal save path so
        // derived fields and parent pointers are rebuilt.
        for name in &entry_names {
            match self.restore_page_from_archive(&mut archive, name) {
                Ok(page) => {
                    if !overwrite_existing && existing.contains(&page.slug) {
                        pages_skipped += 1;
                        continue;
                    }
                    let draft = PageDraft {
                        title: page.title.clone(),
                        content: page.content.clone(),
                        parent_slug: page.parent_slug.clone(),
                        is_sub_page: page.is_sub_page,
                        hide_from_sidebar: page.hide_from_sidebar,
                        tags: page.tags.clone(),
                    };
                    match self.storage.save_page(&page.slug, &draft) {
                        Ok(_) => pages_restored += 1,
                        Err(e) => {
                            warn!("Failed to restore page {}: {}", page.slug, e);
                            failed_pages.push((page.slug, e.to_string()));
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to read archive entry {}: {}", name, e);
                    failed_pages.push((name.clone(), e.to_string()));
                }
            }
        }

        if let Ok(mut entry) = archive.by_name(ARCHIVE_SETTINGS_ENTRY) {
            let mut raw = String::new();
            if entry.read_to_string(&mut raw).is_ok() {
                if let Ok(settings) = serde_json::from_str::<serde_json::Map<String, Value>>(&raw) {
                    for (key, value) in settings {
                        if let Err(e) = self.storage.save_setting(&key, value) {
                            failed_pages.push((key, e.to_string()));
                        }
                    }
                }
            }
        }

        let summary = RestoreArchiveSummary {
            archive_file: archive_path.to_path_buf(),
            total_pages: entry_names.len(),
            pages_restored,
            pages_skipped,
            failed_pages,
        };

        info!(
            "Archive restore complete: restored {}, skipped {}, failed {} from {}",
            summary.pages_restored,
            summary.pages_skipped,
            summary.failed_pages.len(),
            archive_path.display()
        );
        Ok(summary)
    }

    fn restore_page_from_archive(
        &self,
        archive: &mut ZipArchive<File>,
        entry_name: &str,
    ) -> Result<Page> {
        let mut entry = archive.by_name(entry_name)?;
        let mut raw = String::new();
        entry
            .read_to_string(&mut raw)
            .map_err(|e| PvError::RestoreFailed {
                message: format!("Failed to read archive entry {entry_name}: {e}"),
            })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Removes the oldest archives once the configured limit is exceeded.
    fn cleanup_old_archives(&self) -> Result<()> {
        let max_backups = self.storage.config().max_backups;
        if max_backups == 0 {
            return Ok(());
        }

        let mut archives: Vec<(PathBuf, std::time::SystemTime)> =
            WalkDir::new(&self.storage.config().backup_dir)
                .max_depth(1)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| {
                    let path = entry.path();
                    path.is_file()
                        && path.extension().is_some_and(|ext| ext == "zip")
                        && path
                            .file_name()
                            .is_some_and(|name| name.to_string_lossy().starts_with(ARCHIVE_PREFIX))
                })
                .filter_map(|entry| {
                    let modified = entry.metadata().ok()?.modified().ok()?;
                    Some((entry.path().to_path_buf(), modified))
                })
                .collect();

        if archives.len() <= max_backups as usize {
            return Ok(());
        }

        // Oldest first; everything before the cut gets removed.
        archives.sort_by_key(|(_, modified)| *modified);
        let excess = archives.len() - max_backups as usize;
        for (path, _) in archives.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => debug!("Removed old archive: {}", path.display()),
                Err(e) => warn!("Failed to remove old archive {}: {}", path.display(), e),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use serde_json::json;
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> MigrationEngine {
        let config = Config::rooted_at(dir.path());
        let storage = Arc::new(StorageManager::new(config.clone()));
        storage.open().unwrap();
        let legacy = Arc::new(LegacyStore::new(&config.legacy_path));
        MigrationEngine::new(storage, legacy)
    }

    fn doc(text: &str) -> Value {
        json!({
            "type": "doc",
            "content": [{
                "type": "paragraph",
                "content": [{ "type": "text", "text": text }]
            }]
        })
    }

    fn seed_legacy(engine: &MigrationEngine) {
        let pages = json!({
            "welcome": {
                "title": "Welcome",
                "content": doc("hello there"),
                "isSubPage": false
            },
            "notes/ideas": {
                "content": doc("sub page"),
                "parentSlug": "welcome",
                "isSubPage": true
            }
        });
        engine
            .legacy
            .set_item(KEY_PAGES, serde_json::to_string(&pages).unwrap())
            .unwrap();
        engine
            .legacy
            .set_item(KEY_CONTENT, serde_json::to_string(&doc("current")).unwrap())
            .unwrap();
        engine
            .legacy
            .set_item(KEY_API_CONFIG, r#"{"provider":"openai","key":"sk-test"}"#)
            .unwrap();
        engine.legacy.set_item(KEY_BACKGROUND_OPACITY, "0.35").unwrap();
        engine
            .legacy
            .set_item(KEY_COLLAPSED_PAGES, r#"["welcome"]"#)
            .unwrap();
    }

    #[test]
    fn needs_migration_requires_legacy_data_without_marker() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);
        assert!(!e.needs_migration());

        seed_legacy(&e);
        assert!(e.needs_migration());

        e.legacy.set_item(KEY_MIGRATED, "true").unwrap();
        assert!(!e.needs_migration());
    }

    #[test]
    fn migrate_transfers_pages_and_settings() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);
        seed_legacy(&e);

        let report = e.migrate();
        assert!(report.success, "errors: {:?}", report.errors);
        // Two blob pages plus the current-document slot.
        assert_eq!(report.migrated_pages, 3);

        let welcome = e.storage.get_page("welcome").unwrap().unwrap();
        assert_eq!(welcome.title, "Welcome");
        assert_eq!(welcome.text(), "hello there");

        // Missing titles default to Untitled.
        let sub = e.storage.get_page("notes/ideas").unwrap().unwrap();
        assert_eq!(sub.title, "Untitled");
        assert_eq!(sub.parent_slug.as_deref(), Some("welcome"));

        let home = e.storage.get_page("index").unwrap().unwrap();
        assert_eq!(home.title, "Home");

        assert_eq!(
            e.storage.get_setting("background-opacity").unwrap(),
            Some(json!(0.35))
        );
        assert_eq!(
            e.storage.get_setting("collapsed-pages").unwrap(),
            Some(json!(["welcome"]))
        );
        assert!(e.storage.get_setting("api-config").unwrap().is_some());
    }

    #[test]
    fn migrate_is_idempotent_via_the_completion_marker() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);
        seed_legacy(&e);

        let first = e.migrate();
        assert_eq!(first.migrated_pages, 3);
        assert!(!e.needs_migration());

        let created = e.storage.get_page("welcome").unwrap().unwrap().created_at;

        let second = e.migrate();
        assert!(second.success);
        assert_eq!(second.migrated_pages, 0);
        assert_eq!(
            e.storage.get_page("welcome").unwrap().unwrap().created_at,
            created
        );
    }

    #[test]
    fn per_item_failures_do_not_abort_the_run() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);

        let pages = json!({
            "good-one": { "title": "One", "content": doc("1") },
            "broken": 42,
            "good-two": { "title": "Two", "content": doc("2") }
        });
        e.legacy
            .set_item(KEY_PAGES, serde_json::to_string(&pages).unwrap())
            .unwrap();

        let report = e.migrate();
        assert!(!report.success);
        assert_eq!(report.migrated_pages, 2);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("broken"));

        assert!(e.storage.get_page("good-one").unwrap().is_some());
        assert!(e.storage.get_page("good-two").unwrap().is_some());

        // The marker is still set; failed items are not retried.
        assert!(!e.needs_migration());
    }

    #[test]
    fn cleanup_removes_only_the_enumerated_keys() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);
        seed_legacy(&e);
        e.legacy.set_item("unrelated-key", "survives").unwrap();
        e.migrate();

        e.cleanup_local_storage(true).unwrap();

        assert!(!e.legacy.contains(KEY_PAGES));
        assert!(!e.legacy.contains(KEY_CONTENT));
        assert!(!e.legacy.contains(KEY_COLLAPSED_PAGES));
        // Backed up but not in the removal set.
        assert!(e.legacy.contains(KEY_API_CONFIG));
        assert!(e.legacy.contains("unrelated-key"));
        assert!(e.legacy.contains(KEY_BACKUP));
        assert!(e.legacy.contains(KEY_BACKUP_DATE));
    }

    #[test]
    fn restore_from_backup_reinstates_keys_and_clears_the_marker() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);
        seed_legacy(&e);
        e.migrate();
        e.cleanup_local_storage(true).unwrap();

        assert!(e.restore_from_backup());
        assert!(e.legacy.contains(KEY_PAGES));
        assert!(!e.legacy.contains(KEY_MIGRATED));
        assert!(e.needs_migration());
    }

    #[test]
    fn restore_without_backup_reports_false() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);
        assert!(!e.restore_from_backup());
    }

    #[test]
    fn export_then_import_roundtrips_the_corpus() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);
        seed_legacy(&e);
        e.migrate();

        let bundle = e.export_all_data().unwrap();
        assert_eq!(bundle.version, "1.0.0");
        assert_eq!(bundle.pages.len(), 3);
        assert!(bundle.pages.iter().all(|p| p.id.is_none()));

        let target_dir = TempDir::new().unwrap();
        let target = engine(&target_dir);
        let report = target.import_data(&serde_json::to_value(&bundle).unwrap());

        assert!(report.success, "errors: {:?}", report.errors);
        assert_eq!(report.imported_pages, 3);
        assert!(target.storage.get_page("welcome").unwrap().is_some());
        assert_eq!(
            target.storage.get_setting("background-opacity").unwrap(),
            Some(json!(0.35))
        );
    }

    #[test]
    fn import_rejects_a_bundle_without_pages() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);

        let report = e.import_data(&json!({ "settings": {} }));
        assert!(!report.success);
        assert_eq!(report.imported_pages, 0);
        assert!(report.errors[0].contains("pages array not found"));
    }

    #[test]
    fn archive_backup_restores_missing_pages_and_skips_existing() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);
        seed_legacy(&e);
        e.migrate();

        let archive = e.create_archive_backup().unwrap();
        assert!(archive.exists());

        e.storage.delete_page("welcome").unwrap();

        let summary = e.restore_archive_backup(&archive, false).unwrap();
        assert_eq!(summary.total_pages, 3);
        // "welcome" and its cascade-deleted child come back; "index" exists.
        assert_eq!(summary.pages_restored, 2);
        assert_eq!(summary.pages_skipped, 1);
        assert!(summary.failed_pages.is_empty());
        assert!(e.storage.get_page("welcome").unwrap().is_some());
    }

    #[test]
    fn restore_rejects_a_missing_archive() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);
        let missing = dir.path().join("nope.zip");
        assert!(matches!(
            e.restore_archive_backup(&missing, true),
            Err(PvError::RestoreFailed { .. })
        ));
    }
}
