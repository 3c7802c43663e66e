pub mod collection;
pub mod manager;
pub mod models;
pub mod scheduler;
pub mod search;

pub use collection::Collection;
pub use manager::{CollectionManager, ExecutorError};

use std::path::PathBuf;
use thiserror::Error;

use crate::database::search::SearchError;

/// Errors raised by a collection store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to prepare collection directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid search: {0}")]
    Search(#[from] SearchError),

    #[error("Deck not found: {0}")]
    DeckNotFound(i64),

    #[error("Note not found: {0}")]
    NoteNotFound(i64),

    #[error("Card not found: {0}")]
    CardNotFound(i64),

    #[error("Model {model} has no field named {field}")]
    UnknownField { model: String, field: String },

    #[error("Note has no content")]
    EmptyNote,

    #[error("Corrupt collection data: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
