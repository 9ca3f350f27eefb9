use boardsync_core::HybridStorage;

use crate::commands::common::{normalize_board_name, resolve_board};
use crate::error::CliError;

pub async fn run_create(storage: &HybridStorage, name_parts: &[String]) -> Result<(), CliError> {
    let name = normalize_board_name(name_parts)?;
    let board = storage.create_board(&name).await?;
    println!("{}", board.id);
    Ok(())
}

pub async fn run_rename(
    storage: &HybridStorage,
    id: &str,
    name_parts: &[String],
) -> Result<(), CliError> {
    let name = normalize_board_name(name_parts)?;
    let board = resolve_board(storage, id).await?;
    storage.update_board_name(&board.id, &name).await?;
    println!("{}", board.id);
    Ok(())
}

pub async fn run_delete(storage: &HybridStorage, id: &str) -> Result<(), CliError> {
    let board = resolve_board(storage, id).await?;
    storage.delete_board(&board.id).await?;
    println!("{}", board.id);
    Ok(())
}
