use std::path::Path;

use boardsync_core::HybridStorage;

use crate::commands::common::{format_sync_timestamp, read_scene_input, resolve_board};
use crate::error::CliError;

pub async fn run_show(storage: &HybridStorage, id: &str, as_json: bool) -> Result<(), CliError> {
    let board = resolve_board(storage, id).await?;
    let data = storage.load_board_data(&board.id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    println!("{}  {}", data.board.id, data.board.name);
    println!("  modified  {}", format_sync_timestamp(data.board.last_modified));
    println!("  version   {}", data.content.version);
    println!("  elements  {}", data.content.elements.len());
    println!("  files     {}", data.files.len());
    if let Some(checksum) = &data.content.checksum {
        println!("  checksum  {checksum}");
    }
    Ok(())
}

pub async fn run_save(
    storage: &HybridStorage,
    id: &str,
    input: Option<&Path>,
) -> Result<(), CliError> {
    let scene = read_scene_input(input)?;
    let board = resolve_board(storage, id).await?;
    let outcome = storage
        .save(&board.id, scene.elements, scene.app_state, scene.files)
        .await?;
    let pushed = storage.push_board_content(&board.id).await?;

    println!(
        "{}  version {}{}",
        outcome.board_id,
        outcome.version,
        if pushed { "  (pushed)" } else { "" }
    );
    Ok(())
}
