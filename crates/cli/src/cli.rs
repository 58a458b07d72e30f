use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Operator tool for the file-backed user directory.
///
/// Loads the user record files the same way the authorization server does,
/// so a directory can be checked before it is deployed or watched live.
#[derive(Parser, Debug)]
#[command(name = "userdir", version, about)]
pub struct CliArgs {
    /// Config profile; `{PROFILE}_{KEY}` env vars take precedence over `{KEY}`.
    #[arg(long, global = true, env = "USERDIR_PROFILE", default_value = "")]
    pub profile: String,

    /// Root directory of the record files (overrides USERS_DATA_DIR).
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Descend into subdirectories (overrides USERS_RECURSIVE).
    #[arg(long, global = true)]
    pub recursive: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the directory once and report what was found.
    Check,

    /// Load the directory once and print one user (password redacted).
    Lookup {
        /// Find by user id.
        #[arg(long, conflicts_with = "username", required_unless_present = "username")]
        id: Option<String>,

        /// Find by username.
        #[arg(long)]
        username: Option<String>,
    },

    /// Load the directory and keep it current until interrupted.
    Watch {
        /// Seconds between health log lines (0 disables).
        #[arg(long, env = "USERDIR_HEALTH_INTERVAL", default_value_t = 60)]
        health_interval: u64,
    },
}
