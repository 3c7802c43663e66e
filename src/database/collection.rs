use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::database::models::note::{join_fields, join_tags, NoteRow};
use crate::database::models::note_type::NoteTypeRow;
use crate::database::models::{Card, CardQueue, Deck, Note, NoteType};
use crate::database::scheduler::Scheduler;
use crate::database::search::{self, SqlArg, SqlFilter, Target};
use crate::database::StoreError;

const SCHEMA: [&str; 7] = [
    "CREATE TABLE IF NOT EXISTS col (
        id       INTEGER PRIMARY KEY CHECK (id = 1),
        cur_deck INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS models (
        id    INTEGER PRIMARY KEY,
        name  TEXT NOT NULL UNIQUE,
        flds  TEXT NOT NULL,
        tmpls TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS decks (
        id   INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS notes (
        id   INTEGER PRIMARY KEY,
        mid  INTEGER NOT NULL REFERENCES models (id),
        flds TEXT NOT NULL,
        tags TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cards (
        id    INTEGER PRIMARY KEY,
        nid   INTEGER NOT NULL REFERENCES notes (id),
        did   INTEGER NOT NULL REFERENCES decks (id),
        ord   INTEGER NOT NULL,
        due   INTEGER NOT NULL,
        queue INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE INDEX IF NOT EXISTS ix_cards_nid ON cards (nid)",
    "CREATE INDEX IF NOT EXISTS ix_cards_sched ON cards (did, queue, due)",
];

/// One open collection store.
///
/// Not shareable: every method takes `&mut self`, and the only owner is the
/// collection's actor in [`crate::database::manager`].
pub struct Collection {
    path: PathBuf,
    conn: SqliteConnection,
    scheduler: Scheduler,
}

impl Collection {
    /// Open (creating if needed) the store file at `path` and make sure it is seeded
    /// with the default deck and model.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StoreError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let mut conn = SqliteConnection::connect_with(&options).await?;
        Self::migrate(&mut conn).await?;

        info!(path = %path.display(), "Opened collection");
        Ok(Self {
            path: path.to_path_buf(),
            conn,
            scheduler: Scheduler::default(),
        })
    }

    async fn migrate(conn: &mut SqliteConnection) -> Result<(), StoreError> {
        let mut tx = conn.begin().await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        let initialized: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM col")
            .fetch_one(&mut *tx)
            .await?;
        if initialized == 0 {
            sqlx::query("INSERT INTO decks (id, name) VALUES (?, ?)")
                .bind(Deck::DEFAULT_ID)
                .bind(Deck::DEFAULT_NAME)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO models (id, name, flds, tmpls) VALUES (?, ?, ?, ?)")
                .bind(NoteType::DEFAULT_ID)
                .bind(NoteType::DEFAULT_NAME)
                .bind(serde_json::to_string(&NoteType::DEFAULT_FIELDS)?)
                .bind(serde_json::to_string(&NoteType::DEFAULT_TEMPLATES)?)
                .execute(&mut *tx)
                .await?;
            sqlx::query("INSERT INTO col (id, cur_deck) VALUES (1, ?)")
                .bind(Deck::DEFAULT_ID)
                .execute(&mut *tx)
                .await?;
            debug!("Seeded new collection");
        }

        tx.commit().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn close(self) -> Result<(), StoreError> {
        self.conn.close().await?;
        info!(path = %self.path.display(), "Closed collection");
        Ok(())
    }

    //
    // MODELS
    //

    pub async fn all_models(&mut self) -> Result<Vec<NoteType>, StoreError> {
        let rows: Vec<NoteTypeRow> =
            sqlx::query_as("SELECT id, name, flds, tmpls FROM models ORDER BY id")
                .fetch_all(&mut self.conn)
                .await?;
        rows.into_iter().map(NoteType::try_from).collect()
    }

    pub async fn model_by_name(&mut self, name: &str) -> Result<Option<NoteType>, StoreError> {
        let row: Option<NoteTypeRow> =
            sqlx::query_as("SELECT id, name, flds, tmpls FROM models WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut self.conn)
                .await?;
        row.map(NoteType::try_from).transpose()
    }

    pub async fn model_by_id(&mut self, id: i64) -> Result<Option<NoteType>, StoreError> {
        let row: Option<NoteTypeRow> =
            sqlx::query_as("SELECT id, name, flds, tmpls FROM models WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut self.conn)
                .await?;
        row.map(NoteType::try_from).transpose()
    }

    //
    // DECKS
    //

    pub async fn all_decks(&mut self) -> Result<Vec<Deck>, StoreError> {
        Ok(sqlx::query_as::<_, Deck>("SELECT id, name FROM decks ORDER BY id")
            .fetch_all(&mut self.conn)
            .await?)
    }

    pub async fn current_deck_id(&mut self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT cur_deck FROM col WHERE id = 1")
            .fetch_one(&mut self.conn)
            .await?)
    }

    /// Make `deck_id` the deck new cards go to and the scheduler draws from.
    ///
    /// Re-selecting the current deck keeps the review queue where it is.
    pub async fn select_deck(&mut self, deck_id: i64) -> Result<(), StoreError> {
        let previous = self.current_deck_id().await?;
        let updated = sqlx::query(
            "UPDATE col SET cur_deck = ? WHERE id = 1 AND EXISTS (SELECT 1 FROM decks WHERE id = ?)",
        )
        .bind(deck_id)
        .bind(deck_id)
        .execute(&mut self.conn)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::DeckNotFound(deck_id));
        }
        if previous != deck_id {
            self.scheduler.reset();
        }
        Ok(())
    }

    //
    // NOTES
    //

    /// Ids of notes matching `query`, in ascending id order.
    pub async fn find_notes(&mut self, query: &str) -> Result<Vec<i64>, StoreError> {
        let filter = search::to_sql(&search::parse(query)?, Target::Notes);
        let sql = format!("SELECT n.id FROM notes n{} ORDER BY n.id", filter.where_clause());
        self.fetch_ids(&sql, filter).await
    }

    pub async fn get_note(&mut self, id: i64) -> Result<Note, StoreError> {
        let row: Option<NoteRow> = sqlx::query_as("SELECT id, mid, flds, tags FROM notes WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut self.conn)
            .await?;
        row.map(Note::from).ok_or(StoreError::NoteNotFound(id))
    }

    /// Add a note of `model` and generate one card per template in the selected deck.
    ///
    /// Everything is validated before the first write, and the note and its cards are
    /// inserted in one transaction.
    pub async fn add_note(
        &mut self,
        model: &NoteType,
        fields: &[(String, String)],
        tags: &[String],
    ) -> Result<i64, StoreError> {
        let mut values = vec![String::new(); model.fields.len()];
        for (name, value) in fields {
            let index = model
                .field_index(name)
                .ok_or_else(|| StoreError::UnknownField {
                    model: model.name.clone(),
                    field: name.clone(),
                })?;
            values[index] = value.clone();
        }
        if values.iter().all(|v| v.trim().is_empty()) {
            return Err(StoreError::EmptyNote);
        }

        let deck_id = self.current_deck_id().await?;

        let mut tx = self.conn.begin().await?;
        let note_id = sqlx::query("INSERT INTO notes (mid, flds, tags) VALUES (?, ?, ?)")
            .bind(model.id)
            .bind(join_fields(&values))
            .bind(join_tags(tags))
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();

        for template in &model.templates {
            sqlx::query("INSERT INTO cards (nid, did, ord, due, queue) VALUES (?, ?, ?, ?, ?)")
                .bind(note_id)
                .bind(deck_id)
                .bind(template.ord)
                .bind(note_id)
                .bind(CardQueue::New as i64)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        // new cards belong in the queue
        self.scheduler.reset();

        debug!(note_id, model = %model.name, cards = model.templates.len(), "Added note");
        Ok(note_id)
    }

    //
    // CARDS
    //

    /// Ids of cards whose note matches `query`, in ascending id order.
    pub async fn find_cards(&mut self, query: &str) -> Result<Vec<i64>, StoreError> {
        let filter = search::to_sql(&search::parse(query)?, Target::Cards);
        let sql = format!(
            "SELECT c.id FROM cards c JOIN notes n ON n.id = c.nid{} ORDER BY c.id",
            filter.where_clause()
        );
        self.fetch_ids(&sql, filter).await
    }

    pub async fn get_card(&mut self, id: i64) -> Result<Card, StoreError> {
        self.card(id).await?.ok_or(StoreError::CardNotFound(id))
    }

    async fn card(&mut self, id: i64) -> Result<Option<Card>, StoreError> {
        Ok(
            sqlx::query_as::<_, Card>("SELECT id, nid, did, ord, due, queue FROM cards WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut self.conn)
                .await?,
        )
    }

    //
    // SCHEDULER
    //

    /// Next unsuspended card from the selected deck, or `None` once the queue is spent.
    pub async fn next_card(&mut self) -> Result<Option<Card>, StoreError> {
        if !self.scheduler.is_built() {
            let deck_id = self.current_deck_id().await?;
            let ids: Vec<i64> = sqlx::query_scalar(
                "SELECT id FROM cards WHERE did = ? AND queue >= 0 ORDER BY due, id",
            )
            .bind(deck_id)
            .fetch_all(&mut self.conn)
            .await?;
            self.scheduler.rebuild(ids);
        }

        while let Some(id) = self.scheduler.pop() {
            if let Some(card) = self.card(id).await? {
                if !card.is_suspended() {
                    return Ok(Some(card));
                }
            }
        }
        Ok(None)
    }

    pub fn sched_reset(&mut self) {
        self.scheduler.reset();
    }

    async fn fetch_ids(&mut self, sql: &str, filter: SqlFilter) -> Result<Vec<i64>, StoreError> {
        let mut query = sqlx::query_scalar::<_, i64>(sql);
        for arg in filter.args {
            query = match arg {
                SqlArg::Text(text) => query.bind(text),
                SqlArg::Int(id) => query.bind(id),
            };
        }
        Ok(query.fetch_all(&mut self.conn).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, Collection) {
        let dir = tempfile::tempdir().unwrap();
        let col = Collection::open(&dir.path().join("alice").join("collection.anki2"))
            .await
            .unwrap();
        (dir, col)
    }

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn new_collection_is_seeded() {
        let (_dir, mut col) = open_temp().await;

        let decks = col.all_decks().await.unwrap();
        assert_eq!(decks, vec![Deck { id: 1, name: "Default".into() }]);

        let basic = col.model_by_name("Basic").await.unwrap().unwrap();
        assert_eq!(basic.field_names(), vec!["Front".to_string(), "Back".to_string()]);
        assert_eq!(col.model_by_id(basic.id).await.unwrap(), Some(basic));
        assert!(col.model_by_name("Cloze").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn add_and_find_notes() {
        let (_dir, mut col) = open_temp().await;
        let basic = col.model_by_name("Basic").await.unwrap().unwrap();

        let first = col
            .add_note(&basic, &fields(&[("Front", "hola"), ("Back", "hello")]), &["foo".into()])
            .await
            .unwrap();
        let second = col
            .add_note(&basic, &fields(&[("Front", "adios")]), &["bar".into(), "foo".into()])
            .await
            .unwrap();
        col.add_note(&basic, &fields(&[("Front", "gato")]), &[]).await.unwrap();

        assert_eq!(col.find_notes("tag:foo").await.unwrap(), vec![first, second]);
        assert_eq!(col.find_notes("hola").await.unwrap(), vec![first]);
        assert_eq!(col.find_notes("").await.unwrap().len(), 3);
        assert_eq!(col.find_cards("tag:bar").await.unwrap().len(), 1);

        let note = col.get_note(first).await.unwrap();
        assert_eq!(note.fields, vec!["hola".to_string(), "hello".to_string()]);
        assert_eq!(note.tags, vec!["foo".to_string()]);
    }

    #[tokio::test]
    async fn rejected_note_leaves_no_trace() {
        let (_dir, mut col) = open_temp().await;
        let basic = col.model_by_name("Basic").await.unwrap().unwrap();

        let err = col
            .add_note(&basic, &fields(&[("Front", "x"), ("Nope", "y")]), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownField { .. }));

        let err = col.add_note(&basic, &fields(&[("Front", "  ")]), &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::EmptyNote));

        assert!(col.find_notes("").await.unwrap().is_empty());
        assert!(col.find_cards("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn select_unknown_deck_fails() {
        let (_dir, mut col) = open_temp().await;
        assert!(matches!(col.select_deck(99).await, Err(StoreError::DeckNotFound(99))));
        col.select_deck(Deck::DEFAULT_ID).await.unwrap();
        assert_eq!(col.current_deck_id().await.unwrap(), Deck::DEFAULT_ID);
    }

    #[tokio::test]
    async fn scheduler_hands_out_each_card_once_until_reset() {
        let (_dir, mut col) = open_temp().await;
        let basic = col.model_by_name("Basic").await.unwrap().unwrap();
        col.add_note(&basic, &fields(&[("Front", "one")]), &[]).await.unwrap();
        col.add_note(&basic, &fields(&[("Front", "two")]), &[]).await.unwrap();

        let first = col.next_card().await.unwrap().unwrap();
        let second = col.next_card().await.unwrap().unwrap();
        assert!(first.due <= second.due);
        assert_ne!(first.id, second.id);
        assert!(col.next_card().await.unwrap().is_none());

        col.sched_reset();
        assert_eq!(col.next_card().await.unwrap(), Some(first.clone()));

        // re-selecting the same deck does not rewind the queue
        col.select_deck(Deck::DEFAULT_ID).await.unwrap();
        assert_eq!(col.next_card().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn reopening_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bob").join("collection.anki2");

        let mut col = Collection::open(&path).await.unwrap();
        let basic = col.model_by_name("Basic").await.unwrap().unwrap();
        let id = col.add_note(&basic, &fields(&[("Front", "persist")]), &[]).await.unwrap();
        col.close().await.unwrap();

        let mut col = Collection::open(&path).await.unwrap();
        assert_eq!(col.find_notes("persist").await.unwrap(), vec![id]);
        assert_eq!(col.all_decks().await.unwrap().len(), 1);
        assert_eq!(col.path(), path.as_path());
    }
}
