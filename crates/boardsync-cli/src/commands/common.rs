use std::env;
use std::fmt;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use boardsync_core::{
    Board, BoardFile, BoardId, DatabaseService, HttpRemoteApi, HybridStorage, LocalStore,
    ManualConnectivity, QueuedOperation, RemoteConfig, StaticToken, SyncContext, SyncSettings,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cli::Cli;
use crate::error::CliError;

pub const ENV_DB_PATH: &str = "BOARDSYNC_DB_PATH";
pub const ENV_USER_ID: &str = "BOARDSYNC_USER_ID";
pub const ENV_REMOTE_URL: &str = "BOARDSYNC_REMOTE_URL";
pub const ENV_TOKEN: &str = "BOARDSYNC_TOKEN";

/// Where the store lives and who it syncs for, flags first, then environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub db_path: PathBuf,
    pub user_id: Option<String>,
    pub remote_url: Option<String>,
    pub token: Option<String>,
    pub offline: bool,
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SessionOptions")
            .field("db_path", &self.db_path)
            .field("user_id", &self.user_id)
            .field("remote_url", &self.remote_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("offline", &self.offline)
            .finish()
    }
}

impl SessionOptions {
    pub fn from_cli(cli: &Cli) -> Self {
        Self::resolve(cli, |name| env::var(name).ok())
    }

    pub fn resolve(cli: &Cli, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |flag: &Option<String>, name: &str| {
            normalize_text(flag.as_deref()).or_else(|| normalize_text(lookup(name).as_deref()))
        };
        Self {
            db_path: cli
                .db_path
                .clone()
                .or_else(|| lookup(ENV_DB_PATH).map(PathBuf::from))
                .unwrap_or_else(default_db_path),
            user_id: pick(&cli.user, ENV_USER_ID),
            remote_url: pick(&cli.remote_url, ENV_REMOTE_URL),
            token: pick(&cli.token, ENV_TOKEN),
            offline: cli.offline,
        }
    }

    pub fn require_user(&self, command: &'static str) -> Result<&str, CliError> {
        self.user_id
            .as_deref()
            .ok_or(CliError::UserRequired(command))
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("boardsync")
        .join("boards.db")
}

/// Open the local store and, when a user is given, switch on cloud sync.
pub async fn open_storage(options: &SessionOptions) -> Result<HybridStorage, CliError> {
    if let Some(parent) = options.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = DatabaseService::open_path(options.db_path.clone())?;
    open_storage_with(options, db).await
}

pub async fn open_storage_with(
    options: &SessionOptions,
    db: DatabaseService,
) -> Result<HybridStorage, CliError> {
    tracing::debug!(
        db_path = %options.db_path.display(),
        user_id = options.user_id.as_deref().unwrap_or("anonymous"),
        offline = options.offline,
        "Opening board store"
    );
    let local = LocalStore::open(db).await?;
    let connectivity = Arc::new(ManualConnectivity::new(!options.offline));
    let ctx = SyncContext::new(SyncSettings::from_env()?, connectivity);

    let storage = match options.remote_url.as_deref() {
        Some(url) => {
            let config = RemoteConfig::new(url)?;
            let tokens = Arc::new(StaticToken::new(options.token.clone()));
            let api = HttpRemoteApi::new(&config, tokens)?;
            HybridStorage::with_remote(local, ctx, Arc::new(api))
        }
        None => HybridStorage::new(local, ctx),
    };

    if let Some(user_id) = options.user_id.as_deref() {
        if options.remote_url.is_none() {
            return Err(CliError::RemoteNotConfigured);
        }
        storage.enable_cloud_sync(user_id).await?;
    } else {
        storage.release_user_cache().await?;
    }
    Ok(storage)
}

/// Find a board by exact id, then by unique id prefix.
pub async fn resolve_board(storage: &HybridStorage, query: &str) -> Result<Board, CliError> {
    let query = normalize_board_identifier(query)?;
    if let Some(board) = storage.local().get_board(&BoardId::from(query.as_str())).await {
        if !board.pending_delete {
            return Ok(board);
        }
    }

    let mut matching: Vec<Board> = storage
        .get_boards()
        .await?
        .into_iter()
        .filter(|board| board.id.as_str().starts_with(&query))
        .collect();

    match matching.len() {
        0 => Err(CliError::BoardNotFound(query)),
        1 => Ok(matching.remove(0)),
        _ => {
            let options = matching
                .iter()
                .take(3)
                .map(|board| short_id(&board.id))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousBoardId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BoardListItem {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub last_modified: i64,
    pub relative_time: String,
    pub synced: bool,
}

pub fn board_to_list_item(board: &Board) -> BoardListItem {
    let now_ms = Utc::now().timestamp_millis();
    BoardListItem {
        id: board.id.to_string(),
        name: board.name.clone(),
        created_at: board.created_at,
        last_modified: board.last_modified,
        relative_time: format_relative_time(board.last_modified, now_ms),
        synced: !board.id.is_temporary(),
    }
}

pub fn format_board_lines(boards: &[Board]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    boards
        .iter()
        .map(|board| {
            let short_id = short_id(&board.id);
            let name = preview(&board.name, 40);
            let relative_time = format_relative_time(board.last_modified, now_ms);
            if board.id.is_temporary() {
                format!("{short_id:<14}  {name:<40}  {relative_time:<10}  (not synced)")
            } else {
                format!("{short_id:<14}  {name:<40}  {relative_time}")
            }
        })
        .collect()
}

pub fn format_operation_lines(operations: &[QueuedOperation]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    operations
        .iter()
        .map(|op| {
            let id = op.id.to_string();
            let short = id.chars().take(8).collect::<String>();
            let queued = format_relative_time(op.timestamp, now_ms);
            format!(
                "{short}  {:<6}  {:<24}  retries={}  {queued}",
                op.kind().to_string(),
                op.entity_id,
                op.retry_count
            )
        })
        .collect()
}

pub fn short_id(id: &BoardId) -> String {
    id.as_str().chars().take(14).collect()
}

pub fn preview(text: &str, max_chars: usize) -> String {
    let mut preview = text.chars().take(max_chars).collect::<String>();
    if text.chars().count() > max_chars {
        preview.pop();
        preview.push('…');
    }
    preview
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn normalize_text(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_board_name(parts: &[String]) -> Result<String, CliError> {
    normalize_text(Some(&parts.join(" "))).ok_or(CliError::EmptyBoardName)
}

pub fn normalize_board_identifier(id: &str) -> Result<String, CliError> {
    normalize_text(Some(id)).ok_or(CliError::EmptyBoardId)
}

/// Scene document accepted by `save`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDocument {
    #[serde(default)]
    pub elements: Vec<Value>,
    #[serde(default)]
    pub app_state: Map<String, Value>,
    #[serde(default)]
    pub files: Vec<BoardFile>,
}

pub fn parse_scene(raw: &str) -> Result<SceneDocument, CliError> {
    if raw.trim().is_empty() {
        return Err(CliError::EmptyInput);
    }
    Ok(serde_json::from_str(raw)?)
}

pub fn read_scene_input(path: Option<&Path>) -> Result<SceneDocument, CliError> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => read_piped_stdin()?.ok_or(CliError::EmptyInput)?,
    };
    parse_scene(&raw)
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(Some(buffer))
}
