//! CLI module
//!
//! Command-line interface for backing up conversations.
//!
//! # Commands
//!
//! - `backup` - Download or resume a conversation's history
//! - `media` - Download photos, documents and profile photos of a backup
//! - `export` - Render a backup as HTML, one page per day
//! - `status` - Show what a backup holds
//! - `delete` - Remove a backup

mod commands;
mod runner;

pub use commands::{Cli, Commands, TargetKindArg};
pub use runner::{format_hms, format_sync_progress, Runner};
