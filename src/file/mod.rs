//! Local file store bridge: discovery, store paths and change watching.

mod discovery;
mod node;
pub mod watcher;

pub use discovery::discover;
pub use node::{FileNode, files_roots, store_path};
pub use watcher::{Change, ChangeBatch, FileWatcher};
