//! CLI argument definitions for Stickfix.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use stickfix_store::DEFAULT_CONFIG_PATH;

/// Stickfix -- tag-indexed sticker registry.
#[derive(Parser)]
#[command(
    name = "stickfix",
    version,
    about = "Stickfix -- tag-indexed sticker registry",
    long_about = "Administer a Stickfix registry: link stickers to tags, run scoped \
                  queries, manage users and backups, or run the maintenance loop."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the data directory from the configuration file.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Link a sticker to one or more tags.
    Add {
        /// Id of the user performing the change.
        caller: String,
        /// Sticker id.
        sticker: String,
        /// Tags to link.
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Unlink a sticker from one or more tags.
    Remove {
        caller: String,
        sticker: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// List the stickers carrying every given tag.
    Get {
        caller: String,
        /// Tags to match. A random tag is used when none are given.
        tags: Vec<String>,

        /// Shuffle the result.
        #[arg(long, short)]
        shuffle: bool,

        /// Skip this many results.
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Return at most this many results.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one inline result page.
    Inline {
        caller: String,
        tags: Vec<String>,

        /// Page offset, as returned by the previous page.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Pick a random sticker carrying a tag.
    Random { caller: String, tag: String },

    /// Signal that a caller used one of its results.
    Consume { caller: String },

    /// Manage user records.
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Flush the registry to disk.
    Save,

    /// Verify the registry file and restore from backups if it is corrupt.
    Check,

    /// Roll the registry back to a backup generation.
    Restore {
        /// Backup generation (1 = newest, 2 = oldest).
        #[arg(value_parser = clap::value_parser!(u8).range(1..=2))]
        generation: u8,
    },

    /// Show registry statistics.
    Stats {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run periodic backups, integrity checks and cache sweeps until Ctrl-C.
    Serve,
}

/// Actions for managing user records.
#[derive(Subcommand)]
pub enum UserAction {
    /// Create a user with default settings.
    Create { id: String },
    /// Delete a user and all of its tags.
    Delete { id: String },
    /// Set whether the user reads and writes only its own collection.
    Mode { id: String, mode: Mode },
    /// Turn result shuffling on or off.
    Shuffle { id: String, state: Toggle },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Mode {
    Private,
    Public,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Commands {
    /// Whether the command changes the registry and must be saved.
    pub fn mutates(&self) -> bool {
        matches!(self, Self::Add { .. } | Self::Remove { .. } | Self::User { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_with_global_flags() {
        let cli = Cli::try_parse_from([
            "stickfix", "add", "42", "CAAD", "cat", "cute", "--data-dir", "/tmp/sf",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/sf")));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        match cli.command {
            Commands::Add { caller, sticker, tags } => {
                assert_eq!(caller, "42");
                assert_eq!(sticker, "CAAD");
                assert_eq!(tags, ["cat", "cute"]);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn add_requires_a_tag() {
        assert!(Cli::try_parse_from(["stickfix", "add", "42", "CAAD"]).is_err());
    }

    #[test]
    fn restore_rejects_unknown_generation() {
        assert!(Cli::try_parse_from(["stickfix", "restore", "3"]).is_err());
        assert!(Cli::try_parse_from(["stickfix", "restore", "2"]).is_ok());
    }

    #[test]
    fn only_writes_are_saved() {
        let user = Cli::try_parse_from(["stickfix", "user", "mode", "42", "private"]).unwrap();
        assert!(user.command.mutates());

        let get = Cli::try_parse_from(["stickfix", "get", "42", "cat"]).unwrap();
        assert!(!get.command.mutates());
    }
}
