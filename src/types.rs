//! Core data structures for the pagevault crate.
//!
//! This module contains the shared result alias, the report/summary types
//! returned by migration and backup operations, and the CLI command surface.

use std::path::PathBuf;

use clap::Subcommand;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Page, PvError};

/// A specialized Result type for pagevault operations.
pub type Result<T> = std::result::Result<T, PvError>;

/// Outcome of a one-time legacy-store migration run.
#[derive(Debug, Clone)]
pub struct MigrationReport {
    /// True when every item transferred without error
    pub success: bool,
    /// Pages transferred, including the legacy current-document slot
    pub migrated_pages: usize,
    /// One descriptive message per failed item
    pub errors: Vec<String>,
}

/// Outcome of a full-corpus JSON import.
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub success: bool,
    pub imported_pages: usize,
    pub errors: Vec<String>,
}

/// Summary of an archive restoration operation.
#[derive(Debug, Clone)]
pub struct RestoreArchiveSummary {
    /// Path to the archive that was restored
    pub archive_file: PathBuf,
    /// Total number of page records found in the archive
    pub total_pages: usize,
    /// Number of pages successfully restored
    pub pages_restored: usize,
    /// Number of pages skipped (existing pages with overwrite disabled)
    pub pages_skipped: usize,
    /// Details about pages that failed to restore
    pub failed_pages: Vec<(String, String)>, // (slug, error_message)
}

/// Collection size and host storage capacity, where the platform exposes it.
///
/// Quota fields are omitted from serialized output rather than defaulted to
/// zero when the environment cannot report them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub page_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_used: Option<f64>,
}

/// Full-corpus snapshot produced by export and consumed by import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBundle {
    pub version: String,
    /// ISO-8601 timestamp of when the snapshot was taken
    pub export_date: String,
    /// Page records with the store-assigned identifier stripped
    pub pages: Vec<Page>,
    /// Setting key to value map
    #[serde(default)]
    pub settings: serde_json::Map<String, Value>,
}

/// Synchronization state of the in-memory page directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
    /// No load has been attempted yet
    Idle,
    /// A refresh is in flight
    Loading,
    /// The map reflects the primary store
    Ready,
    /// The primary store failed; the map was populated from the fallback
    Degraded,
}

/// Available subcommands for the pagevault CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// List pages in the sidebar hierarchy
    List {
        /// Include pages marked as hidden from the sidebar
        #[clap(short, long)]
        all: bool,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// View a page by slug
    View {
        /// Slug of the page to view
        slug: String,

        /// Format output as raw JSON
        #[clap(short, long)]
        json: bool,

        /// Show the cached HTML snapshot instead of extracted text
        #[clap(long)]
        html: bool,
    },

    /// Create or update a page
    Save {
        /// Slug of the page to save
        slug: String,

        /// Title of the page
        #[clap(short = 'T', long, default_value = "Untitled")]
        title: String,

        /// Path to a file containing the page content as document JSON
        #[clap(short, long)]
        file: Option<PathBuf>,

        /// Slug of the parent page
        #[clap(short, long)]
        parent: Option<String>,

        /// Mark the page as a sub-page
        #[clap(short, long)]
        sub_page: bool,

        /// Hide the page from the sidebar listing
        #[clap(long)]
        hidden: bool,
    },

    /// Edit a page's content JSON in the default editor
    Edit {
        /// Slug of the page to edit
        slug: String,
    },

    /// Delete a page and its direct sub-pages
    Delete {
        /// Slug of the page to delete
        slug: String,

        /// Skip confirmation prompt
        #[clap(short, long)]
        force: bool,
    },

    /// Search pages by title or content
    Search {
        /// Search query text
        query: String,

        /// Limit the number of search results
        #[clap(short = 'n', long, default_value_t = 10)]
        limit: usize,

        /// Use fuzzy matching instead of substring ranking
        #[clap(long)]
        fuzzy: bool,

        /// Format output as JSON
        #[clap(short, long)]
        json: bool,
    },

    /// Migrate data from the legacy flat store
    Migrate {
        /// Remove legacy keys after a successful migration
        #[clap(short, long)]
        cleanup: bool,

        /// Skip the legacy backup blob when cleaning up
        #[clap(long)]
        no_backup: bool,
    },

    /// Export all pages and settings to a JSON bundle
    Export {
        /// Path for the exported bundle
        output: PathBuf,
    },

    /// Import pages and settings from a JSON bundle
    Import {
        /// Path to the bundle to import
        input: PathBuf,
    },

    /// Create a ZIP archive backup of the whole store
    Backup,

    /// Restore pages and settings from a ZIP archive
    Restore {
        /// Path to the archive file
        archive: PathBuf,

        /// Overwrite pages that already exist
        #[clap(short, long)]
        overwrite: bool,
    },

    /// Show storage usage and migration status
    Info,
}
