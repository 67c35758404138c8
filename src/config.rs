use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use which::which;

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Root directory of the persistent page store
    pub data_dir: PathBuf,

    /// Path of the legacy flat key-value store file
    pub legacy_path: PathBuf,

    /// Directory for archive backups
    pub backup_dir: PathBuf,

    /// Whether the scheduler creates archive backups automatically
    pub auto_backup: bool,

    /// How often to create archive backups (in hours)
    pub backup_frequency: u32,

    /// Maximum number of archive backups to keep (0 keeps all)
    pub max_backups: u32,

    /// Default editor command for the CLI edit flow
    pub editor_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        // Fall back to a relative directory when the platform refuses to
        // report a home directory (headless containers).
        let base = ProjectDirs::from("io", "pagevault", "pagevault")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".pagevault"));

        Self {
            data_dir: base.join("store"),
            legacy_path: base.join("legacy-store.json"),
            backup_dir: base.join("backups"),
            auto_backup: false,
            backup_frequency: 24,
            max_backups: 5,
            editor_command: None,
        }
    }
}

impl Config {
    /// Create a configuration rooted at a single directory, used by tests
    /// and by the CLI `--data-dir` override.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("store"),
            legacy_path: root.join("legacy-store.json"),
            backup_dir: root.join("backups"),
            ..Self::default()
        }
    }

    // This method provides smart fallbacks when no editor is configured
    pub fn get_editor_command(&self) -> String {
        // First try the configured editor
        if let Some(editor) = &self.editor_command {
            return editor.clone();
        }

        // Then try environment variable
        if let Ok(editor) = std::env::var("EDITOR") {
            return editor;
        }

        // Fall back to platform defaults
        if cfg!(windows) {
            "notepad".to_string()
        } else if cfg!(target_os = "macos") {
            "open -t".to_string()
        } else {
            // Try common Linux editors
            for editor in &["nano", "vim", "vi", "emacs"] {
                if which(editor).is_ok() {
                    return editor.to_string();
                }
            }
            "nano".to_string()
        }
    }
}
