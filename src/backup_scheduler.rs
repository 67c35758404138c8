// src/backup_scheduler.rs - Periodic archive backup scheduler
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use chrono::Utc;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

use crate::{Config, MigrationEngine, PvError, Result};

#[derive(Debug, Clone)]
pub struct BackupSchedulerStatus {
    /// Whether the scheduler is running
    pub is_running: bool,
    /// The time the last archive was created
    pub last_backup_time: Option<chrono::DateTime<Utc>>,
    /// The path to the last archive file
    pub last_backup_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum BackupCommand {
    /// Create an archive backup immediately
    CreateBackupNow,
    /// Stop the backup scheduler
    Stop,
}

/// Creates archive backups of the page store on a fixed interval.
pub struct BackupScheduler {
    /// Configuration for the scheduler
    config: Config,

    /// Channel to send commands to the scheduler task
    command_tx: mpsc::Sender<BackupCommand>,

    /// Handle to the scheduler task
    scheduler_task: Option<JoinHandle<()>>,

    /// Current status of the scheduler
    status: BackupSchedulerStatus,

    /// Weak reference to the migration engine that owns archive creation
    engine: Option<Weak<MigrationEngine>>,
}

impl BackupScheduler {
    /// Create a new backup scheduler with the provided config
    pub fn new(config: Config) -> Self {
        let (command_tx, _) = mpsc::channel(10);

        Self {
            config,
            command_tx,
            scheduler_task: None,
            status: BackupSchedulerStatus {
                is_running: false,
                last_backup_time: None,
                last_backup_path: None,
            },
            engine: None,
        }
    }

    /// Set the weak reference to the migration engine
    pub fn set_engine(&mut self, engine: Arc<MigrationEngine>) {
        self.engine = Some(Arc::downgrade(&engine));
        debug!("Engine reference set in BackupScheduler");
    }

    /// Start the backup scheduler; a no-op when auto backup is disabled
    pub async fn start(&mut self) -> Result<()> {
        if !self.config.auto_backup {
            return Ok(());
        }

        info!("Starting backup scheduler...");

        let engine = match &self.engine {
            Some(weak) => match weak.upgrade() {
                Some(strong) => strong,
                None => {
                    error!("Failed to retrieve migration engine - reference is no longer valid");
                    return Err(PvError::ApplicationError {
                        message: "MigrationEngine reference is no longer valid".to_string(),
                    });
                }
            },
            None => {
                error!("No engine reference found in BackupScheduler");
                return Err(PvError::ApplicationError {
                    message: "BackupScheduler does not have an engine reference".to_string(),
                });
            }
        };

        let (command_tx, mut command_rx) = mpsc::channel(10);
        self.command_tx = command_tx;

        let backup_frequency_secs = self.config.backup_frequency as u64 * 3600;

        let task = tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(backup_frequency_secs));
            interval.tick().await; // Initial tick

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match engine.create_archive_backup() {
                            Ok(path) => info!("Scheduled archive created at {}", path.display()),
                            Err(e) => error!("Scheduled archive failed: {}", e),
                        };
                    }
                    Some(cmd) = command_rx.recv() => match cmd {
                        BackupCommand::CreateBackupNow => {
                            match engine.create_archive_backup() {
                                Ok(path) => info!("Manual archive created at {}", path.display()),
                                Err(e) => error!("Manual archive failed: {}", e),
                            };
                        },
                        BackupCommand::Stop => {
                            info!("Backup scheduler stopping...");
                            break;
                        }
                    }
                }
            }
        });

        self.scheduler_task = Some(task);
        self.status.is_running = true;

        Ok(())
    }

    /// Stop the backup scheduler if it's running
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.scheduler_task.take() {
            if let Err(e) = self.command_tx.send(BackupCommand::Stop).await {
                error!("Failed to send stop command to backup scheduler: {}", e);
            }

            if let Err(e) = task.await {
                let message = format!("Failed to stop backup scheduler: {}", e);
                error!("{}", message);
                return Err(PvError::BackupFailed { message });
            }

            self.status.is_running = false;
            info!("Backup scheduler stopped");
        } else {
            debug!("Backup scheduler is not running");
        }

        Ok(())
    }

    /// Create an archive immediately, regardless of the schedule
    pub async fn create_backup_now(&self) -> Result<()> {
        if !self.status.is_running {
            return Err(PvError::BackupFailed {
                message: "Backup scheduler is not running".to_string(),
            });
        }

        self.command_tx
            .send(BackupCommand::CreateBackupNow)
            .await
            .map_err(|e| PvError::BackupFailed {
                message: format!("Failed to send backup command: {}", e),
            })?;

        Ok(())
    }

    /// Get the current status of the backup scheduler
    pub fn get_status(&self) -> BackupSchedulerStatus {
        self.status.clone()
    }

    /// Update the scheduler's last backup information
    pub fn update_last_backup(&mut self, path: PathBuf) {
        self.status.last_backup_time = Some(Utc::now());
        self.status.last_backup_path = Some(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, LegacyStore, StorageManager};
    use tempfile::TempDir;

    fn engine(dir: &TempDir) -> Arc<MigrationEngine> {
        let config = Config::rooted_at(dir.path());
        let storage = Arc::new(StorageManager::new(config.clone()));
        storage.open().unwrap();
        let legacy = Arc::new(LegacyStore::new(&config.legacy_path));
        Arc::new(MigrationEngine::new(storage, legacy))
    }

    #[tokio::test]
    async fn disabled_scheduler_does_not_start() {
        let dir = TempDir::new().unwrap();
        let mut scheduler = BackupScheduler::new(Config::rooted_at(dir.path()));
        scheduler.set_engine(engine(&dir));

        scheduler.start().await.unwrap();
        assert!(!scheduler.get_status().is_running);
    }

    #[tokio::test]
    async fn start_requires_an_engine_reference() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::rooted_at(dir.path());
        config.auto_backup = true;

        let mut scheduler = BackupScheduler::new(config);
        assert!(scheduler.start().await.is_err());
    }

    #[tokio::test]
    async fn manual_backup_flows_through_the_running_scheduler() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::rooted_at(dir.path());
        config.auto_backup = true;
        config.backup_frequency = 1;

        let e = engine(&dir);
        let mut scheduler = BackupScheduler::new(config.clone());
        scheduler.set_engine(Arc::clone(&e));

        scheduler.start().await.unwrap();
        assert!(scheduler.get_status().is_running);

        scheduler.create_backup_now().await.unwrap();
        scheduler.stop().await.unwrap();
        assert!(!scheduler.get_status().is_running);

        // The manual command produced an archive on disk.
        let archives: Vec<_> = std::fs::read_dir(&config.backup_dir)
            .map(|entries| entries.filter_map(|e| e.ok()).collect())
            .unwrap_or_default();
        assert!(!archives.is_empty());
    }
}
