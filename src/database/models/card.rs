use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Queue a card sits in. Stored as an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i64)]
pub enum CardQueue {
    Suspended = -1,
    New = 0,
}

/// One reviewable card, generated from a note and one of its model's templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Card {
    pub id: i64,
    #[sqlx(rename = "nid")]
    pub note_id: i64,
    #[sqlx(rename = "did")]
    pub deck_id: i64,
    /// Template ordinal within the note's model
    pub ord: i64,
    pub due: i64,
    pub queue: i64,
}

impl Card {
    pub fn is_suspended(&self) -> bool {
        self.queue == CardQueue::Suspended as i64
    }
}
