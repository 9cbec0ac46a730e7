//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, TargetKindArg};
use crate::config::ArchiverConfig;
use crate::engine::{SyncEngine, SyncEvent, SyncOutcome, SyncProgress};
use crate::error::{Error, Result};
use crate::export::{ExportProgress, Exporter};
use crate::layout::BackupLayout;
use crate::media::{MediaOutcome, MediaProgress, MediaRetriever, MediaSelection};
use crate::remote::HttpFetcher;
use crate::state::{CheckpointStore, ResumeState, ResumeStateManager};
use crate::store::{DuckDbStore, RecordFilter, RecordStore};
use crate::types::SyncTarget;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
    cancel: CancellationToken,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that stops the running command cleanly when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn command_name(&self) -> &'static str {
        self.cli.command.name()
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        let config = self.load_config()?;

        match &self.cli.command {
            Commands::Backup {
                kind,
                id,
                name,
                chunk_size,
                delay_ms,
            } => {
                let mut config = config;
                if let Some(chunk_size) = chunk_size {
                    config.sync.chunk_size = *chunk_size;
                }
                if let Some(delay_ms) = delay_ms {
                    config.sync.page_delay_ms = *delay_ms;
                }
                config.validate()?;
                self.backup(&config, *kind, *id, name).await
            }
            Commands::Media {
                id,
                no_profile_photos,
                no_photos,
                no_documents,
            } => {
                let configured = config.media_selection();
                let selection = MediaSelection {
                    profile_photos: configured.profile_photos && !no_profile_photos,
                    photos: configured.photos && !no_photos,
                    documents: configured.documents && !no_documents,
                };
                self.media(&config, *id, selection).await
            }
            Commands::Export { id, output } => {
                let output = output
                    .clone()
                    .unwrap_or_else(|| config.export.output_dir.clone());
                self.export(&config, *id, output).await
            }
            Commands::Status { id } => self.status(&config, *id).await,
            Commands::Delete { id, yes } => self.delete(&config, *id, *yes),
        }
    }

    /// Load configuration and apply global overrides
    fn load_config(&self) -> Result<ArchiverConfig> {
        let mut config = match &self.cli.config {
            Some(path) => ArchiverConfig::from_file(path)?,
            None => ArchiverConfig::default(),
        };
        if let Some(dir) = &self.cli.backups_dir {
            config.backups_dir = dir.clone();
        }
        Ok(config)
    }

    /// Layout of an existing backup
    fn existing_backup(config: &ArchiverConfig, id: i64) -> Result<BackupLayout> {
        let layout = BackupLayout::new(&config.backups_dir, id);
        if !layout.exists() {
            return Err(Error::config(format!(
                "No backup for target {id} in {}",
                config.backups_dir.display()
            )));
        }
        Ok(layout)
    }

    /// Download history
    async fn backup(
        &self,
        config: &ArchiverConfig,
        kind: TargetKindArg,
        id: i64,
        name: &str,
    ) -> Result<()> {
        let target = SyncTarget::new(kind.with_id(id), name);
        let layout = BackupLayout::new(&config.backups_dir, id);
        layout.ensure()?;

        let store = Arc::new(DuckDbStore::open(layout.database_path())?);
        let remote = Arc::new(HttpFetcher::from_config(config.http_config())?);
        let checkpoints = Arc::new(ResumeStateManager::new(
            layout.metadata_path(),
            config.protocol_version,
        ));

        let mut engine =
            SyncEngine::new(store, remote, checkpoints).with_config(config.sync_config());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    SyncEvent::Progress(progress) => println!("{}", format_sync_progress(&progress)),
                    SyncEvent::PhaseChanged(phase) => info!(%phase, "Sync phase"),
                    SyncEvent::Finished(_) => {}
                }
            }
        });

        info!(target_name = %target, backup = %layout.root().display(), "Starting backup");
        let result = engine.run(&target, Some(&tx), &self.cancel).await;
        drop(tx);
        let _ = printer.await;

        match result? {
            SyncOutcome::Completed => println!(
                "Backup of {} complete ({} new messages)",
                target.name,
                engine.stats().records_inserted
            ),
            SyncOutcome::Cancelled => println!("Backup cancelled; run again to resume"),
        }
        Ok(())
    }

    /// Download media for an existing backup
    async fn media(&self, config: &ArchiverConfig, id: i64, selection: MediaSelection) -> Result<()> {
        let layout = Self::existing_backup(config, id)?;
        let store = Arc::new(DuckDbStore::open(layout.database_path())?);
        let remote = Arc::new(HttpFetcher::from_config(config.http_config())?);

        let retriever = MediaRetriever::new(store, remote, layout)
            .with_rate_limit(&config.media_rate_limit());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                println!("{}", format_media_progress(&progress));
            }
        });

        let report = retriever.spawn(selection, Some(tx), self.cancel.clone()).await;
        let _ = printer.await;
        let report = report.map_err(|e| Error::Other(format!("Media task failed: {e}")))??;

        for (category, counts) in &report.categories {
            println!(
                "{category}: {} downloaded, {} already present, {} failed",
                counts.downloaded, counts.skipped, counts.failed
            );
        }
        if report.cancelled {
            println!("Media download cancelled; run again to resume");
        } else {
            println!("Success rate: {:.2}%", report.success_rate() * 100.0);
        }
        Ok(())
    }

    /// Export an existing backup
    async fn export(&self, config: &ArchiverConfig, id: i64, output: PathBuf) -> Result<()> {
        let layout = Self::existing_backup(config, id)?;
        let checkpoints = ResumeStateManager::new(layout.metadata_path(), config.protocol_version);
        let name = checkpoints
            .load()
            .await?
            .map_or_else(|| id.to_string(), |cp| cp.target_name);

        let store = Arc::new(DuckDbStore::open(layout.database_path())?);
        let exporter = Exporter::new(store, output).with_media_root(layout.root().join("media"));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let printer = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                println!("{}", format_export_progress(&progress));
            }
        });

        let summary = exporter.spawn(name, Some(tx), self.cancel.clone()).await;
        let _ = printer.await;
        let summary = summary.map_err(|e| Error::Other(format!("Export task failed: {e}")))??;

        println!(
            "Exported {} messages into {} pages",
            summary.exported,
            summary.units.len()
        );
        for day in &summary.failed_units {
            println!("Failed to write page for {day}");
        }
        if summary.cancelled {
            println!("Export cancelled");
        }
        Ok(())
    }

    /// Print what a backup holds
    async fn status(&self, config: &ArchiverConfig, id: i64) -> Result<()> {
        let layout = Self::existing_backup(config, id)?;
        let checkpoint = ResumeStateManager::new(layout.metadata_path(), config.protocol_version)
            .load()
            .await?;
        let store = DuckDbStore::open(layout.database_path())?;

        let name = checkpoint
            .as_ref()
            .map_or("(unknown)", |cp| cp.target_name.as_str());
        println!("Target:           {name} ({id})");
        println!(
            "State:            {}",
            ResumeState::from_checkpoint(checkpoint.as_ref()).label()
        );
        println!("Stored messages:  {}", store.count(RecordFilter::All)?);
        println!("Stored authors:   {}", store.count_authors()?);
        if let Some(cp) = &checkpoint {
            println!("Protocol version: {}", cp.protocol_version);
        }
        println!("Location:         {}", layout.root().display());
        Ok(())
    }

    /// Remove a backup directory
    fn delete(&self, config: &ArchiverConfig, id: i64, confirmed: bool) -> Result<()> {
        let layout = Self::existing_backup(config, id)?;
        if !confirmed {
            return Err(Error::config(format!(
                "Refusing to delete {} without --yes",
                layout.root().display()
            )));
        }
        layout.delete()?;
        println!("Deleted backup {}", layout.root().display());
        Ok(())
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner").field("cli", &self.cli).finish_non_exhaustive()
    }
}

// ============================================================================
// Progress Formatting
// ============================================================================

/// `hh:mm:ss`, hours not capped at 24
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// `[xx.xx%, ETA: hh:mm:ss] Downloaded a out of b messages`
pub fn format_sync_progress(progress: &SyncProgress) -> String {
    format!(
        "[{:.2}%, ETA: {}] Downloaded {} out of {} messages",
        progress.fraction() * 100.0,
        format_hms(progress.eta),
        progress.downloaded,
        progress.total
    )
}

fn format_export_progress(progress: &ExportProgress) -> String {
    let percent = if progress.total == 0 {
        100.0
    } else {
        progress.exported as f64 / progress.total as f64 * 100.0
    };
    format!(
        "[{percent:.2}%, ETL: {}] Exported {} out of {} messages",
        format_hms(progress.etl),
        progress.exported,
        progress.total
    )
}

fn format_media_progress(progress: &MediaProgress) -> String {
    let status = match &progress.outcome {
        MediaOutcome::Downloaded => "downloaded".to_string(),
        MediaOutcome::Skipped => "already present".to_string(),
        MediaOutcome::Failed(reason) => format!("failed: {reason}"),
    };
    format!(
        "[{} {}/{}] {}: {status}",
        progress.category, progress.index, progress.total, progress.blob_id
    )
}
