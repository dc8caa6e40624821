pub mod bookmarks;
pub mod controller;
pub mod pane;
pub mod share;
pub mod storage;

pub use controller::{AppController, ViewMode};
