use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "boardsync")]
#[command(about = "Local-first whiteboard storage with encrypted cloud sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Signed-in user id; enables cloud sync (env: BOARDSYNC_USER_ID)
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<String>,

    /// Remote store base URL (env: BOARDSYNC_REMOTE_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub remote_url: Option<String>,

    /// Bearer token for the remote store (env: BOARDSYNC_TOKEN)
    #[arg(long, global = true, value_name = "TOKEN")]
    pub token: Option<String>,

    /// Treat the remote as unreachable and queue every mutation
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List boards
    #[command(alias = "ls")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new board
    #[command(alias = "new")]
    Create {
        /// Board name
        name: Vec<String>,
    },
    /// Rename a board
    Rename {
        /// Board ID or unique ID prefix
        id: String,
        /// New name
        name: Vec<String>,
    },
    /// Delete a board
    Delete {
        /// Board ID or unique ID prefix
        id: String,
    },
    /// Show a board and its content
    Show {
        /// Board ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save scene JSON (`elements`, `appState`, `files`) into a board
    Save {
        /// Board ID or unique ID prefix
        id: String,
        /// Scene file (stdin when omitted)
        #[arg(short, long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List operations waiting for the remote
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay the offline queue now
    Flush,
    /// Disable cloud sync and wipe the signed-in user's local data
    Logout,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
