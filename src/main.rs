use std::sync::Arc;

use clap::Parser;
use log::{info, warn};

use pagevault::{
    App, Cli, Config, LegacyStore, MigrationEngine, PageDirectory, PageStore, StorageManager,
};

fn initialize_logger(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    initialize_logger(cli.verbose);

    let config = match &cli.data_dir {
        Some(root) => Config::rooted_at(root),
        None => Config::default(),
    };

    let storage = Arc::new(StorageManager::new(config.clone()));
    let legacy = Arc::new(LegacyStore::new(&config.legacy_path));
    let engine = Arc::new(MigrationEngine::new(
        Arc::clone(&storage),
        Arc::clone(&legacy),
    ));

    // Open the store and run the one-time migration. An open failure is not
    // fatal: the directory degrades to the legacy store for this session.
    match engine.initialize() {
        Ok(Some(report)) => info!(
            "Migration finished: {} pages, {} errors",
            report.migrated_pages,
            report.errors.len()
        ),
        Ok(None) => {}
        Err(e) => warn!("Persistent store unavailable, degrading: {}", e),
    }

    let directory = Arc::new(PageDirectory::new(
        Arc::clone(&storage) as Arc<dyn PageStore>,
        Arc::clone(&legacy) as Arc<dyn PageStore>,
    ));
    if let Err(e) = directory.refresh() {
        warn!("Failed to load pages from either store: {}", e);
    }

    let app = App::new(storage, directory, engine, config);
    if let Err(e) = app.run(cli.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
