//! CLI command handlers for the pagevault application.
//!
//! This module wires the command-line surface to the page directory and the
//! migration engine.

use std::{
    fs,
    io::{stdin, stdout, Write},
    path::{Path, PathBuf},
    process::Command,
    sync::Arc,
};

use log::info;
use serde_json::Value;
use shell_words::split;
use tempfile::Builder;

use crate::{
    content, Commands, Config, MigrationEngine, Page, PageDirectory, PageDraft, PvError, Result,
    StorageManager,
};

/// CLI application handler - processes commands against the page directory
/// and migration engine.
pub struct App {
    /// The storage manager, used directly for storage info
    storage: Arc<StorageManager>,

    /// The fallback-aware page directory all page commands go through
    directory: Arc<PageDirectory>,

    /// Migration, import/export and archive operations
    engine: Arc<MigrationEngine>,

    /// Application configuration
    config: Config,
}

impl App {
    pub fn new(
        storage: Arc<StorageManager>,
        directory: Arc<PageDirectory>,
        engine: Arc<MigrationEngine>,
        config: Config,
    ) -> Self {
        Self {
            storage,
            directory,
            engine,
            config,
        }
    }

    /// Run the CLI application with the given command
    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::List { all, json } => self.handle_list(all, json),

            Commands::View { slug, json, html } => self.handle_view(&slug, json, html),

            Commands::Save {
                slug,
                title,
                file,
                parent,
                sub_page,
                hidden,
            } => self.handle_save(&slug, title, file, parent, sub_page, hidden),

            Commands::Edit { slug } => self.handle_edit(&slug),

            Commands::Delete { slug, force } => self.handle_delete(&slug, force),

            Commands::Search {
                query,
                limit,
                fuzzy,
                json,
            } => self.handle_search(&query, limit, fuzzy, json),

            Commands::Migrate { cleanup, no_backup } => self.handle_migrate(cleanup, no_backup),

            Commands::Export { output } => self.handle_export(&output),

            Commands::Import { input } => self.handle_import(&input),

            Commands::Backup => {
                let path = self.engine.create_archive_backup()?;
                println!("Archive created at {}", path.display());
                Ok(())
            }

            Commands::Restore { archive, overwrite } => self.handle_restore(&archive, overwrite),

            Commands::Info => self.handle_info(),
        }
    }

    fn handle_list(&self, all: bool, json: bool) -> Result<()> {
        if all {
            // Empty query matches everything, ranked by recency.
            let pages = self.directory.search("");
            return self.display_pages(&pages, json, false);
        }

        let tree = self.directory.sidebar_tree();
        if json {
            let value: Vec<Value> = tree
                .iter()
                .map(|(top, children)| {
                    serde_json::json!({
                        "page": top,
                        "children": children,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        if tree.is_empty() {
            println!("No pages yet.");
            return Ok(());
        }

        for (top, children) in &tree {
            println!(
                "{}  ({})",
                console::style(&top.title).bold(),
                top.slug
            );
            for child in children {
                println!("  └ {}  ({})", child.title, child.slug);
            }
        }
        Ok(())
    }

    fn handle_view(&self, slug: &str, json: bool, html: bool) -> Result<()> {
        let page = self
            .directory
            .load_page(slug)
            .ok_or_else(|| PvError::PageNotFound {
                slug: slug.to_string(),
            })?;

        if json {
            println!("{}", serde_json::to_string_pretty(&page)?);
            return Ok(());
        }

        println!("{}", console::style(&page.title).bold());
        println!(
            "slug: {} | updated: {}",
            page.slug,
            page.updated_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(parent) = &page.parent_slug {
            println!("parent: {}", parent);
        }
        println!();
        if html {
            println!("{}", page.html_content.as_deref().unwrap_or(""));
        } else {
            println!("{}", page.text());
        }
        Ok(())
    }

    fn handle_save(
        &self,
        slug: &str,
        title: String,
        file: Option<PathBuf>,
        parent: Option<String>,
        sub_page: bool,
        hidden: bool,
    ) -> Result<()> {
        let content = match file {
            Some(path) => {
                let raw = fs::read_to_string(&path).map_err(PvError::Io)?;
                serde_json::from_str(&raw)?
            }
            None => content::empty_document(),
        };

        let draft = PageDraft {
            title,
            content,
            parent_slug: parent,
            is_sub_page: sub_page,
            hide_from_sidebar: hidden,
            tags: Vec::new(),
        };

        let page = self.directory.save_page(slug, &draft)?;
        match page.id {
            Some(id) => println!("Saved page {} as record {}", slug, id),
            None => println!("Saved page {} to the fallback store", slug),
        }
        Ok(())
    }

    fn handle_edit(&self, slug: &str) -> Result<()> {
        let page = self
            .directory
            .load_page(slug)
            .ok_or_else(|| PvError::PageNotFound {
                slug: slug.to_string(),
            })?;

        let edited = self.open_editor_for_content(&page)?;

        let draft = PageDraft {
            title: page.title.clone(),
            content: edited,
            parent_slug: page.parent_slug.clone(),
            is_sub_page: page.is_sub_page,
            hide_from_sidebar: page.hide_from_sidebar,
            tags: page.tags.clone(),
        };
        self.directory.save_page(slug, &draft)?;
        println!("Page {} updated from editor", slug);
        Ok(())
    }

    /// Opens the page's content JSON in the configured editor and parses the
    /// result back into a document tree.
    fn open_editor_for_content(&self, page: &Page) -> Result<Value> {
        let temp_file = Builder::new().suffix(".json").tempfile()?;
        let temp_path = temp_file.path().to_path_buf();

        fs::write(&temp_path, serde_json::to_string_pretty(&page.content)?)
            .map_err(PvError::Io)?;

        let editor_cmd = self.config.get_editor_command();
        info!("Opening editor for page {}. Save and exit when done...", page.slug);
        self.launch_editor(&editor_cmd, &temp_path)?;

        let raw = fs::read_to_string(&temp_path).map_err(PvError::Io)?;
        serde_json::from_str(&raw).map_err(|e| PvError::EditorError {
            message: format!("Edited content is not valid document JSON: {e}"),
        })
    }

    fn launch_editor(&self, editor_cmd: &str, file_path: &Path) -> Result<()> {
        let path_str = file_path.to_string_lossy();

        // Handle shell-like command parsing
        let args = split(editor_cmd).map_err(|e| PvError::EditorError {
            message: format!("Failed to parse editor command: {e}"),
        })?;

        if args.is_empty() {
            return Err(PvError::EditorError {
                message: "Empty editor command".to_string(),
            });
        }

        let mut command = Command::new(&args[0]);
        if args.len() > 1 {
            command.args(&args[1..]);
        }
        command.arg(path_str.as_ref());

        let status = command.status()?;
        if !status.success() {
            return Err(PvError::EditorError {
                message: "Editor exited with non-zero status".to_string(),
            });
        }

        Ok(())
    }

    fn handle_delete(&self, slug: &str, force: bool) -> Result<()> {
        let page = self
            .directory
            .load_page(slug)
            .ok_or_else(|| PvError::PageNotFound {
                slug: slug.to_string(),
            })?;

        if !force {
            println!("You are about to delete the following page:");
            println!("Slug:    {}", page.slug);
            println!("Title:   {}", page.title);
            println!("Created: {}", page.created_at.format("%Y-%m-%d %H:%M:%S"));

            let preview = get_content_preview(page.text(), 100);
            if !preview.is_empty() {
                println!("\n{}", preview);
            }

            println!("\nDirect sub-pages will be deleted as well. This cannot be undone!");
            print!("Are you sure you want to delete this page? [y/N]: ");
            stdout().flush().map_err(PvError::Io)?;

            let mut input = String::new();
            stdin().read_line(&mut input).map_err(PvError::Io)?;

            let input = input.trim().to_lowercase();
            if input != "y" && input != "yes" {
                println!("Deletion cancelled.");
                return Ok(());
            }
        }

        self.directory.delete_page(slug)?;
        println!("Page '{}' ({}) has been deleted.", page.title, slug);
        Ok(())
    }

    fn handle_search(&self, query: &str, limit: usize, fuzzy: bool, json: bool) -> Result<()> {
        let mut results = if fuzzy {
            self.fuzzy_search(query)
        } else {
            self.directory.search(query)
        };

        if limit > 0 && results.len() > limit {
            results.truncate(limit);
        }

        if results.is_empty() {
            println!("No pages found matching query: \"{}\"", query);
            return Ok(());
        }

        self.display_pages(&results, json, true)
    }

    /// Fuzzy title/content scoring, with title matches weighted double.
    fn fuzzy_search(&self, query: &str) -> Vec<Page> {
        use fuzzy_matcher::skim::SkimMatcherV2;
        use fuzzy_matcher::FuzzyMatcher;

        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, Page)> = self
            .directory
            .search("")
            .into_iter()
            .filter_map(|page| {
                let title_score = matcher.fuzzy_match(&page.title, query).unwrap_or(0);
                let content_score = matcher.fuzzy_match(page.text(), query).unwrap_or(0);
                let score = title_score * 2 + content_score;
                (score > 0).then_some((score, page))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().map(|(_, page)| page).collect()
    }

    fn handle_migrate(&self, cleanup: bool, no_backup: bool) -> Result<()> {
        if !self.engine.needs_migration() {
            println!("No legacy data pending migration.");
        } else {
            let report = self.engine.migrate();
            println!("Migrated {} page(s).", report.migrated_pages);
            if !report.success {
                println!("{} item(s) failed:", report.errors.len());
                for error in &report.errors {
                    println!("  - {}", console::style(error).red());
                }
            }
        }

        if cleanup {
            self.engine.cleanup_local_storage(!no_backup)?;
            println!(
                "Legacy keys removed{}.",
                if no_backup { "" } else { " (backup kept)" }
            );
        }
        Ok(())
    }

    fn handle_export(&self, output: &Path) -> Result<()> {
        let bundle = self.engine.export_all_data()?;
        fs::write(output, serde_json::to_string_pretty(&bundle)?).map_err(PvError::Io)?;
        println!(
            "Exported {} page(s) and {} setting(s) to {}",
            bundle.pages.len(),
            bundle.settings.len(),
            output.display()
        );
        Ok(())
    }

    fn handle_import(&self, input: &Path) -> Result<()> {
        let raw = fs::read_to_string(input).map_err(PvError::Io)?;
        let data: Value = serde_json::from_str(&raw).map_err(|e| PvError::InvalidFormat {
            message: format!("{} is not valid bundle JSON: {e}", input.display()),
        })?;

        let report = self.engine.import_data(&data);
        println!("Imported {} page(s).", report.imported_pages);
        if !report.success {
            println!("{} item(s) failed:", report.errors.len());
            for error in &report.errors {
                println!("  - {}", console::style(error).red());
            }
        }
        Ok(())
    }

    fn handle_restore(&self, archive: &Path, overwrite: bool) -> Result<()> {
        let summary = self.engine.restore_archive_backup(archive, overwrite)?;
        println!(
            "Restored {} of {} page(s), skipped {} existing.",
            summary.pages_restored, summary.total_pages, summary.pages_skipped
        );
        for (slug, error) in &summary.failed_pages {
            println!("  - {}: {}", slug, console::style(error).red());
        }
        Ok(())
    }

    fn handle_info(&self) -> Result<()> {
        match self.storage.storage_info() {
            Ok(info) => {
                println!("Pages:   {}", info.page_count);
                match info.usage {
                    Some(usage) => println!("Usage:   {} bytes", usage),
                    None => println!("Usage:   unavailable"),
                }
                match info.quota {
                    Some(quota) => println!("Quota:   {} bytes", quota),
                    None => println!("Quota:   unavailable"),
                }
            }
            Err(e) => println!("Persistent store unavailable: {}", e),
        }

        println!("State:   {:?}", self.directory.state());
        if let Some(error) = self.directory.last_error() {
            println!("Error:   {}", console::style(error).red());
        }
        println!("Pending migration: {}", self.engine.needs_migration());
        Ok(())
    }

    /// Display pages in text or JSON format
    fn display_pages(&self, pages: &[Page], json: bool, detailed: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(pages)?);
            return Ok(());
        }

        let term_width = terminal_size::terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(80);

        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                println!("{}", "-".repeat(term_width.min(50)));
            }

            println!(
                "Slug: {} | Updated: {}",
                page.slug,
                page.updated_at.format("%Y-%m-%d %H:%M")
            );
            println!("Title: {}", console::style(&page.title).bold());

            if detailed {
                let preview = get_content_preview(page.text(), 100);
                if !preview.is_empty() {
                    println!("\n{}", preview);
                }
            }
        }

        println!(
            "\nFound {} page{}",
            pages.len(),
            if pages.len() == 1 { "" } else { "s" }
        );
        Ok(())
    }
}

/// Generate a content preview for brief listings
fn get_content_preview(content: &str, max_len: usize) -> String {
    let first_line = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");

    if first_line.chars().count() <= max_len {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}
