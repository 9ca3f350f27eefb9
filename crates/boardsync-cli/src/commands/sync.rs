use boardsync_core::{HybridStorage, StorageMode, SyncState};
use serde::Serialize;

use crate::commands::common::{format_operation_lines, format_sync_timestamp};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub user_id: Option<String>,
    pub state: SyncState,
    pub is_online: bool,
    pub is_cloud_enabled: bool,
    pub pending_operations: usize,
    pub last_sync_timestamp: Option<i64>,
}

pub async fn status_report(storage: &HybridStorage) -> StatusReport {
    let status = storage.sync_status().await;
    let user_id = match storage.mode().await {
        StorageMode::Authenticated { user_id } => Some(user_id),
        StorageMode::Anonymous => None,
    };
    StatusReport {
        user_id,
        state: storage.sync_state().await,
        is_online: status.is_online,
        is_cloud_enabled: status.is_cloud_enabled,
        pending_operations: status.pending_operations,
        last_sync_timestamp: status.last_sync_timestamp,
    }
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Mode:        {}",
            report
                .user_id
                .as_deref()
                .map_or_else(|| "anonymous (local only)".to_string(), |user| format!("signed in as {user}"))
        ),
        format!("Online:      {}", if report.is_online { "yes" } else { "no" }),
        format!(
            "Cloud sync:  {}",
            if report.is_cloud_enabled { "ready" } else { "not ready" }
        ),
        format!("Pending:     {}", report.pending_operations),
    ];
    if report.state == SyncState::Error {
        lines.push("State:       error (run `boardsync flush` to retry)".to_string());
    }
    lines.push(format!(
        "Last sync:   {}",
        report
            .last_sync_timestamp
            .map_or_else(|| "never".to_string(), format_sync_timestamp)
    ));
    lines
}

pub async fn run_status(storage: &HybridStorage, as_json: bool) -> Result<(), CliError> {
    let report = status_report(storage).await;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_queue(storage: &HybridStorage, as_json: bool) -> Result<(), CliError> {
    let operations = storage.pending_operations().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&operations)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("Offline queue is empty.");
        return Ok(());
    }

    for line in format_operation_lines(&operations) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_flush(storage: &HybridStorage) -> Result<(), CliError> {
    let status = storage.sync_status().await;
    if !status.is_online {
        println!("Offline; {} operation(s) pending", status.pending_operations);
        return Ok(());
    }
    if !status.is_cloud_enabled {
        storage.restart_sync().await?;
    }
    let report = storage.process_queue().await?;
    println!(
        "Replayed {} operation(s), dropped {}, {} still pending",
        report.completed, report.dropped, report.remaining
    );
    Ok(())
}

pub async fn run_logout(storage: &HybridStorage) -> Result<(), CliError> {
    storage.disable_cloud_sync().await?;
    println!("Signed out; local boards cleared");
    Ok(())
}
