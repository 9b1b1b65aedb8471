//! Keeps Dify knowledge-base datasets in sync with directories of a file
//! store.

pub mod admin;
pub mod cmd;
pub mod config;
pub mod error;
pub mod file;
pub mod index;
pub mod mapping;
pub mod naming;
pub mod remote;
pub mod scan;
pub mod sync;
pub mod types;

pub use error::{Error, Result};
