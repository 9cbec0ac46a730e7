//! CLI commands and argument parsing

use crate::types::SyncTargetKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Chat history archiver CLI
#[derive(Parser, Debug)]
#[command(name = "chat-archiver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding one backup per target (overrides the config file)
    #[arg(short, long, global = true)]
    pub backups_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download (or resume downloading) a conversation's history
    Backup {
        /// Kind of conversation
        #[arg(long, value_enum)]
        kind: TargetKindArg,

        /// Identity of the user, chat or channel
        #[arg(long)]
        id: i64,

        /// Display name stored with the backup
        #[arg(long)]
        name: String,

        /// Records requested per page (1-100)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Pause between pages in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Download media referenced by a backup
    Media {
        /// Target identity
        #[arg(long)]
        id: i64,

        #[arg(long)]
        no_profile_photos: bool,

        #[arg(long)]
        no_photos: bool,

        #[arg(long)]
        no_documents: bool,
    },

    /// Export a backup to HTML, one page per day
    Export {
        /// Target identity
        #[arg(long)]
        id: i64,

        /// Output directory (overrides the config file)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show what has been backed up for a target
    Status {
        /// Target identity
        #[arg(long)]
        id: i64,
    },

    /// Delete a target's backup
    Delete {
        /// Target identity
        #[arg(long)]
        id: i64,

        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Backup { .. } => "backup",
            Self::Media { .. } => "media",
            Self::Export { .. } => "export",
            Self::Status { .. } => "status",
            Self::Delete { .. } => "delete",
        }
    }
}

/// Conversation kind accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum TargetKindArg {
    User,
    Chat,
    Channel,
}

impl TargetKindArg {
    pub fn with_id(self, id: i64) -> SyncTargetKind {
        match self {
            Self::User => SyncTargetKind::User { user_id: id },
            Self::Chat => SyncTargetKind::Chat { chat_id: id },
            Self::Channel => SyncTargetKind::Channel { channel_id: id },
        }
    }
}
