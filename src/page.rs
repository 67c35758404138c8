//! Record types stored in the persistent page database.
//!
//! Field names serialize in camelCase so records, export bundles and legacy
//! blobs interoperate with data written by the original application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content;

/// A single page of the document hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Store-assigned identifier; absent until first persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Unique routing key, immutable once assigned
    pub slug: String,
    /// User-editable title
    pub title: String,
    /// Opaque structured document tree
    pub content: Value,
    /// Cached plain-text projection of `content`, used for search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    /// Cached HTML snapshot of `content`, used for export and preview
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_content: Option<String>,
    /// Cached identifier of the parent page. Derived from `parent_slug` and
    /// recomputed whenever the record is read or saved, never authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    /// Slug of the parent page; `None` for top-level pages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_slug: Option<String>,
    #[serde(default)]
    pub is_sub_page: bool,
    /// Excluded from the sidebar listing but still addressable and persisted
    #[serde(default)]
    pub hide_from_sidebar: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Fixed at first save
    pub created_at: DateTime<Utc>,
    /// Refreshed on every save
    pub updated_at: DateTime<Utc>,
}

impl Page {
    /// Extracted text of the page, empty when the projection is missing.
    pub fn text(&self) -> &str {
        self.text_content.as_deref().unwrap_or("")
    }
}

/// Caller-supplied payload for a page save.
#[derive(Debug, Clone)]
pub struct PageDraft {
    pub title: String,
    pub content: Value,
    pub parent_slug: Option<String>,
    pub is_sub_page: bool,
    pub hide_from_sidebar: bool,
    pub tags: Vec<String>,
}

impl Default for PageDraft {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            content: content::empty_document(),
            parent_slug: None,
            is_sub_page: false,
            hide_from_sidebar: false,
            tags: Vec::new(),
        }
    }
}

impl PageDraft {
    pub fn new(title: impl Into<String>, content: Value) -> Self {
        Self {
            title: title.into(),
            content,
            ..Self::default()
        }
    }
}

/// A key/value configuration entry, unrelated to any page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: Value,
}

/// Reserved collection: file attachments uploaded into a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub page_id: u64,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Reserved collection: point-in-time content snapshots of a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub page_id: u64,
    pub content: Value,
    pub version_number: u32,
    pub created_at: DateTime<Utc>,
}
