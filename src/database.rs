//! The persistent page store.
//!
//! A directory-backed, versioned database holding four collections: page
//! records as one JSON file each under `pages/`, a `settings.json` key-value
//! map, and the reserved `attachments/` and `versions/` collections. A
//! `manifest.json` pins the schema version and the never-reused page id
//! counter, and `pending-delete.json` journals multi-record deletes so an
//! interrupted cascade is completed on the next open instead of leaving
//! orphans.

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{debug, error, info, warn};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::{Page, PvError, Result, StorageInfo};

/// Schema version this build reads and writes.
const SCHEMA_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const SETTINGS_FILE: &str = "settings.json";
const DELETE_JOURNAL_FILE: &str = "pending-delete.json";
const PAGES_DIR: &str = "pages";
const ATTACHMENTS_DIR: &str = "attachments";
const VERSIONS_DIR: &str = "versions";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    version: u32,
    next_page_id: u64,
}

/// In-memory state built at open time.
struct DbInner {
    /// Unique index: slug to page id. Consulted under the lock on every
    /// put, which is what makes lookup-then-upsert atomic in-process.
    slug_index: HashMap<String, u64>,
    next_page_id: u64,
}

/// A durable, versioned, indexed local page database.
pub struct PageDatabase {
    data_dir: PathBuf,
    inner: Mutex<Option<DbInner>>,
}

impl PageDatabase {
    /// Creates a handle rooted at `data_dir`. Nothing touches the disk until
    /// [`PageDatabase::open`] is called.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            inner: Mutex::new(None),
        }
    }

    /// Opens the database, creating the on-disk layout on first use.
    ///
    /// Safe to call when already open. Failures surface as `Err` so the
    /// caller can degrade to a fallback store; they never abort the process.
    pub fn open(&self) -> Result<()> {
        let mut guard = self.lock_inner()?;
        if guard.is_some() {
            debug!("Page database already open at {}", self.data_dir.display());
            return Ok(());
        }

        info!("Opening page database at {}", self.data_dir.display());

        for dir in [
            self.data_dir.clone(),
            self.data_dir.join(PAGES_DIR),
            self.data_dir.join(ATTACHMENTS_DIR),
            self.data_dir.join(VERSIONS_DIR),
        ] {
            fs::create_dir_all(&dir).map_err(|e| {
                error!("Failed to create store directory {}: {}", dir.display(), e);
                PvError::DirectoryError { path: dir.clone() }
            })?;
        }

        let manifest = self.load_or_create_manifest()?;
        self.replay_delete_journal()?;

        let slug_index = self.build_slug_index();
        // The scanned ids win over a stale manifest counter (e.g. a manifest
        // write lost to a crash) so ids still never collide.
        let max_seen = slug_index.values().copied().max().unwrap_or(0);
        let next_page_id = manifest.next_page_id.max(max_seen + 1);

        info!(
            "Page database open: {} pages indexed, next id {}",
            slug_index.len(),
            next_page_id
        );

        *guard = Some(DbInner {
            slug_index,
            next_page_id,
        });
        drop(guard);

        self.request_durability();
        Ok(())
    }

    /// Whether `open` has completed successfully.
    pub fn is_open(&self) -> bool {
        self.lock_inner().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Inserts or updates a page record, keyed by its unique slug.
    ///
    /// Assigns a fresh id on insert and fills `page.id` either way.
    pub fn put_page(&self, page: &mut Page) -> Result<u64> {
        let mut guard = self.lock_inner()?;
        let inner = Self::require_open(&mut guard)?;

        let id = match inner.slug_index.get(&page.slug) {
            Some(&existing) => existing,
            None => {
                let id = inner.next_page_id;
                inner.next_page_id += 1;
                // Persist the counter before the record exists so a crash in
                // between burns the id instead of reusing it.
                self.write_manifest(inner.next_page_id)?;
                id
            }
        };

        page.id = Some(id);
        atomic_write_json(&self.page_path(id), page)?;
        inner.slug_index.insert(page.slug.clone(), id);
        debug!("Stored page {} as record {}", page.slug, id);
        Ok(id)
    }

    /// Looks up a page by its unique slug. A miss is a normal outcome.
    pub fn get_page_by_slug(&self, slug: &str) -> Result<Option<Page>> {
        let mut guard = self.lock_inner()?;
        let inner = Self::require_open(&mut guard)?;

        let Some(&id) = inner.slug_index.get(slug) else {
            return Ok(None);
        };

        match read_json::<Page>(&self.page_path(id)) {
            Ok(Some(page)) => Ok(Some(page)),
            Ok(None) => {
                // Index entry without a backing file; drop the stale entry.
                warn!("Slug index pointed at missing record {}", id);
                inner.slug_index.remove(slug);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Resolves a slug to its record id without reading the record.
    pub fn resolve_slug(&self, slug: &str) -> Result<Option<u64>> {
        let mut guard = self.lock_inner()?;
        let inner = Self::require_open(&mut guard)?;
        Ok(inner.slug_index.get(slug).copied())
    }

    /// Full scan of the pages collection. Records that fail to parse are
    /// logged and skipped rather than failing the whole scan.
    pub fn all_pages(&self) -> Result<Vec<Page>> {
        {
            let mut guard = self.lock_inner()?;
            Self::require_open(&mut guard)?;
        }

        let mut pages = Vec::new();
        for entry in WalkDir::new(self.data_dir.join(PAGES_DIR))
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match read_json::<Page>(path) {
                Ok(Some(page)) => pages.push(page),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable page record {}: {}", path.display(), e),
            }
        }
        Ok(pages)
    }

    /// Deletes a set of page records through the two-phase journal: the full
    /// id set is journaled first, then each record is removed, then the
    /// journal is cleared. A crash in between is replayed at next open.
    ///
    /// # Arguments
    ///
    /// * `ids` - The record ids to remove as one batch
    pub fn delete_pages(&self, ids: &[u64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let mut guard = self.lock_inner()?;
        let inner = Self::require_open(&mut guard)?;

        let journal_path = self.data_dir.join(DELETE_JOURNAL_FILE);
        atomic_write_json(&journal_path, &ids.to_vec())?;

        for &id in ids {
            let path = self.page_path(id);
            match fs::remove_file(&path) {
                Ok(()) => debug!("Deleted page record {}", id),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    error!("Failed to delete page record {}: {}", id, e);
                    // Leave the journal in place; the next open finishes the job.
                    return Err(PvError::Io(e));
                }
            }
        }

        inner.slug_index.retain(|_, id| !ids.contains(id));
        fs::remove_file(&journal_path).map_err(PvError::Io)?;
        Ok(())
    }

    /// Upserts a setting value keyed by string.
    pub fn put_setting(&self, key: &str, value: Value) -> Result<()> {
        let mut guard = self.lock_inner()?;
        Self::require_open(&mut guard)?;

        let mut settings = self.read_settings_map()?;
        settings.insert(key.to_string(), value);
        atomic_write_json(&self.data_dir.join(SETTINGS_FILE), &settings)?;
        debug!("Stored setting {}", key);
        Ok(())
    }

    /// Looks up a setting value; a miss is a normal outcome.
    pub fn get_setting(&self, key: &str) -> Result<Option<Value>> {
        let mut guard = self.lock_inner()?;
        Self::require_open(&mut guard)?;
        Ok(self.read_settings_map()?.remove(key))
    }

    /// The entire settings collection, used by export.
    pub fn all_settings(&self) -> Result<serde_json::Map<String, Value>> {
        let mut guard = self.lock_inner()?;
        Self::require_open(&mut guard)?;
        self.read_settings_map()
    }

    /// Number of page records currently indexed.
    pub fn page_count(&self) -> Result<usize> {
        let mut guard = self.lock_inner()?;
        let inner = Self::require_open(&mut guard)?;
        Ok(inner.slug_index.len())
    }

    /// Collection size plus on-disk usage. Quota and percent-used are left
    /// out entirely when the host environment cannot report them.
    pub fn storage_info(&self) -> Result<StorageInfo> {
        let page_count = self.page_count()?;

        let usage: u64 = WalkDir::new(&self.data_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter_map(|e| e.metadata().ok())
            .filter(|m| m.is_file())
            .map(|m| m.len())
            .sum();

        Ok(StorageInfo {
            page_count,
            usage: Some(usage),
            quota: None,
            percent_used: None,
        })
    }

    fn page_path(&self, id: u64) -> PathBuf {
        self.data_dir.join(PAGES_DIR).join(format!("{id}.json"))
    }

    fn lock_inner(&self) -> Result<std::sync::MutexGuard<'_, Option<DbInner>>> {
        self.inner.lock().map_err(|_| PvError::LockAcquisitionFailed {
            message: "Failed to acquire lock on page database state".to_string(),
        })
    }

    fn require_open<'a>(
        guard: &'a mut std::sync::MutexGuard<'_, Option<DbInner>>,
    ) -> Result<&'a mut DbInner> {
        guard.as_mut().ok_or_else(|| PvError::StoreClosed {
            message: "call open() before using the page database".to_string(),
        })
    }

    fn load_or_create_manifest(&self) -> Result<Manifest> {
        let path = self.data_dir.join(MANIFEST_FILE);
        match read_json::<Manifest>(&path)? {
            Some(manifest) => {
                if manifest.version != SCHEMA_VERSION {
                    error!(
                        "Store at {} has schema version {}",
                        self.data_dir.display(),
                        manifest.version
                    );
                    return Err(PvError::ManifestVersion {
                        found: manifest.version,
                        expected: SCHEMA_VERSION,
                    });
                }
                Ok(manifest)
            }
            None => {
                debug!("No manifest found, declaring schema version {}", SCHEMA_VERSION);
                let manifest = Manifest {
                    version: SCHEMA_VERSION,
                    next_page_id: 1,
                };
                atomic_write_json(&path, &manifest)?;
                Ok(manifest)
            }
        }
    }

    fn write_manifest(&self, next_page_id: u64) -> Result<()> {
        atomic_write_json(
            &self.data_dir.join(MANIFEST_FILE),
            &Manifest {
                version: SCHEMA_VERSION,
                next_page_id,
            },
        )
    }

    /// Completes a cascade delete that was interrupted mid-flight.
    fn replay_delete_journal(&self) -> Result<()> {
        let path = self.data_dir.join(DELETE_JOURNAL_FILE);
        let Some(ids) = read_json::<Vec<u64>>(&path)? else {
            return Ok(());
        };

        info!("Completing interrupted delete of {} page records", ids.len());
        for id in ids {
            match fs::remove_file(self.page_path(id)) {
                Ok(()) => debug!("Journal replay removed page record {}", id),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(PvError::Io(e)),
            }
        }
        fs::remove_file(&path).map_err(PvError::Io)
    }

    fn build_slug_index(&self) -> HashMap<String, u64> {
        let mut index = HashMap::new();
        for entry in WalkDir::new(self.data_dir.join(PAGES_DIR))
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match read_json::<Page>(path) {
                Ok(Some(page)) => {
                    if let Some(id) = page.id {
                        index.insert(page.slug, id);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Skipping unindexable record {}: {}", path.display(), e),
            }
        }
        index
    }

    /// Best-effort durability request: syncs the data directory so renames
    /// survive power loss where the platform supports it. Non-fatal when it
    /// does not.
    fn request_durability(&self) {
        match fs::File::open(&self.data_dir).and_then(|f| f.sync_all()) {
            Ok(()) => debug!("Durable storage sync granted for {}", self.data_dir.display()),
            Err(e) => debug!("Durable storage sync unavailable: {}", e),
        }
    }

    fn read_settings_map(&self) -> Result<serde_json::Map<String, Value>> {
        Ok(read_json(&self.data_dir.join(SETTINGS_FILE))?.unwrap_or_default())
    }
}

/// Serializes `value` next to `path` and atomically renames it into place.
pub(crate) fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir).map_err(PvError::Io)?;
    let json = serde_json::to_string_pretty(value)?;
    temp.write_all(json.as_bytes()).map_err(PvError::Io)?;
    temp.flush().map_err(PvError::Io)?;
    temp.persist(path).map_err(|e| PvError::Io(e.error))?;
    Ok(())
}

/// Reads and deserializes a JSON file, mapping a missing file to `None`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PvError::Io(e)),
    };
    Ok(Some(serde_json::from_str(&raw)?))
}
