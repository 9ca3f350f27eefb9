pub mod boards;
pub mod common;
pub mod completions;
pub mod list;
pub mod scene;
pub mod sync;
