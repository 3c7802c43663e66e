use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named group of cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Deck {
    pub id: i64,
    pub name: String,
}

impl Deck {
    pub const DEFAULT_ID: i64 = 1;
    pub const DEFAULT_NAME: &'static str = "Default";
}
