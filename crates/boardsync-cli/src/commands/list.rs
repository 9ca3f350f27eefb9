use boardsync_core::HybridStorage;

use crate::commands::common::{board_to_list_item, format_board_lines, BoardListItem};
use crate::error::CliError;

pub async fn run_list(storage: &HybridStorage, as_json: bool) -> Result<(), CliError> {
    let boards = storage.get_boards().await?;

    if as_json {
        let json_items = boards
            .iter()
            .map(board_to_list_item)
            .collect::<Vec<BoardListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if boards.is_empty() {
        println!("No boards yet. Create one with `boardsync create <name>`.");
    } else {
        for line in format_board_lines(&boards) {
            println!("{line}");
        }
    }

    Ok(())
}
