//! Workspace model

use serde::{Deserialize, Serialize};

/// A named container owning a set of boards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: i64,
}
