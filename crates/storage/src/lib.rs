pub mod backend;
pub mod error;
mod path;

pub use crate::backend::{ByteStream, LibraryStorage};
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type StorageHandle = Arc<dyn LibraryStorage + Send + Sync>;
