//! Error types for the pagevault storage core.
//!
//! This module defines custom error types that categorize different failures
//! that can occur during page storage, migration, and backup operations.

use std::{io, path::PathBuf};

use thiserror::Error;

/// The main error type for the pagevault crate.
#[derive(Error, Debug)]
pub enum PvError {
    /// Errors related to file I/O operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Errors related to serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Errors related to zip archive operations.
    #[error("Zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// Page was not found when performing an operation that requires it.
    #[error("Page not found: {slug}")]
    PageNotFound { slug: String },

    /// The persistent store has not been opened yet, or failed to open.
    #[error("Persistent store is not open: {message}")]
    StoreClosed { message: String },

    /// The on-disk manifest declares a schema version this build does not know.
    #[error("Unsupported store schema version {found} (expected {expected})")]
    ManifestVersion { found: u32, expected: u32 },

    /// A page's parent chain is invalid (unresolvable loop back to itself).
    #[error("Invalid parent chain for page {slug}: {message}")]
    InvalidParent { slug: String, message: String },

    /// Directory creation or access failed.
    #[error("Failed to create or access directory: {path}")]
    DirectoryError { path: PathBuf },

    /// Errors related to backup/archive operations.
    #[error("Backup failed: {message}")]
    BackupFailed { message: String },

    /// Error when restoring from a backup or archive.
    #[error("Restore failed: {message}")]
    RestoreFailed { message: String },

    /// Import data did not match the expected bundle format.
    #[error("Invalid import format: {message}")]
    InvalidFormat { message: String },

    /// for mutex lock acquisition issues
    #[error("{message}")]
    LockAcquisitionFailed { message: String },

    #[error("{message}")]
    EditorError { message: String },

    /// Generic application error with a custom message.
    #[error("{message}")]
    ApplicationError { message: String },
}
