// Operations on the collection as a whole: models, note and card search, adding notes,
// deck selection and the scheduler.

use futures::FutureExt;
use serde_json::Value;

use crate::api::format;
use crate::database::models::NoteType;
use crate::database::Collection;
use crate::handlers::card::load_card;
use crate::handlers::note::load_note;
use crate::handlers::utils::{flag, optional_str, require_i64, require_str};
use crate::registry::{HandlerGroup, Operation, OperationError, OperationFuture};
use crate::types::RequestData;

pub struct CollectionHandler;

impl HandlerGroup for CollectionHandler {
    fn name(&self) -> &'static str {
        "CollectionHandler"
    }

    fn operations(&self) -> Vec<Operation> {
        vec![
            // models
            Operation::new("list_models", list_models),
            Operation::new("find_model_by_name", find_model_by_name),
            // notes
            Operation::new("find_notes", find_notes),
            Operation::new("add_note", add_note).no_output(),
            // decks
            Operation::new("list_decks", list_decks),
            Operation::new("select_deck", select_deck).no_output(),
            // cards
            Operation::new("find_cards", find_cards),
            // scheduler
            Operation::new("sched_reset", sched_reset).no_output(),
        ]
    }
}

fn list_models(col: &mut Collection, _data: RequestData, _ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let models = col.all_models().await?;
        Ok(Some(serde_json::to_value(models)?))
    }
    .boxed()
}

/// `{"model": name}` → the model, or an empty response when there is none
fn find_model_by_name(col: &mut Collection, data: RequestData, _ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let name = require_str(&data, "model")?;
        let model = col.model_by_name(name).await?;
        Ok(model.map(serde_json::to_value).transpose()?)
    }
    .boxed()
}

/// `{"query": q, "preload": bool}` → note ids, or full notes with `preload`
fn find_notes(col: &mut Collection, data: RequestData, _ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let query = optional_str(&data, "query")?.unwrap_or_default();
        let ids = col.find_notes(query).await?;

        let nodes = if flag(&data, "preload") {
            let mut nodes = Vec::with_capacity(ids.len());
            for id in ids {
                nodes.push(load_note(col, id).await?);
            }
            nodes
        } else {
            format::ids_to_api_values(&ids)
        };
        Ok(Some(Value::Array(nodes)))
    }
    .boxed()
}

/// `{"model": name|id, "fields": {name: value}, "tags": "a b" | ["a", "b"]}`
fn add_note(col: &mut Collection, data: RequestData, _ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let model = resolve_model(col, &data).await?;
        let fields = note_fields(&data)?;
        let tags = note_tags(&data)?;

        col.add_note(&model, &fields, &tags).await?;
        Ok(None)
    }
    .boxed()
}

fn list_decks(col: &mut Collection, _data: RequestData, _ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let decks = col.all_decks().await?;
        Ok(Some(serde_json::to_value(decks)?))
    }
    .boxed()
}

/// `{"deck_id": id}`
fn select_deck(col: &mut Collection, data: RequestData, _ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let deck_id = require_i64(&data, "deck_id")?;
        col.select_deck(deck_id).await?;
        Ok(None)
    }
    .boxed()
}

/// Same contract as `find_notes`, over cards
fn find_cards(col: &mut Collection, data: RequestData, _ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let query = optional_str(&data, "query")?.unwrap_or_default();
        let ids = col.find_cards(query).await?;

        let cards = if flag(&data, "preload") {
            let mut cards = Vec::with_capacity(ids.len());
            for id in ids {
                cards.push(load_card(col, id).await?);
            }
            cards
        } else {
            format::ids_to_api_values(&ids)
        };
        Ok(Some(Value::Array(cards)))
    }
    .boxed()
}

fn sched_reset(col: &mut Collection, _data: RequestData, _ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        col.sched_reset();
        Ok(None)
    }
    .boxed()
}

/// A string `model` is a model name, a number is a model id
async fn resolve_model(col: &mut Collection, data: &RequestData) -> Result<NoteType, OperationError> {
    let invalid = OperationError::InvalidValue {
        key: "model",
        expected: "a model name or id",
    };
    match data.get("model") {
        None | Some(Value::Null) => Err(OperationError::MissingKey("model")),
        Some(Value::String(name)) => col
            .model_by_name(name)
            .await?
            .ok_or_else(|| OperationError::ModelNotFound(name.clone())),
        Some(Value::Number(n)) => {
            let id = n.as_i64().ok_or(invalid)?;
            col.model_by_id(id)
                .await?
                .ok_or_else(|| OperationError::ModelNotFound(id.to_string()))
        }
        Some(_) => Err(invalid),
    }
}

fn note_fields(data: &RequestData) -> Result<Vec<(String, String)>, OperationError> {
    let invalid = || OperationError::InvalidValue {
        key: "fields",
        expected: "an object of strings",
    };
    match data.get("fields") {
        None | Some(Value::Null) => Err(OperationError::MissingKey("fields")),
        Some(Value::Object(fields)) => fields
            .iter()
            .map(|(name, value)| match value {
                Value::String(s) => Ok((name.clone(), s.clone())),
                _ => Err(invalid()),
            })
            .collect(),
        Some(_) => Err(invalid()),
    }
}

fn note_tags(data: &RequestData) -> Result<Vec<String>, OperationError> {
    let invalid = || OperationError::InvalidValue {
        key: "tags",
        expected: "a string or a list of strings",
    };
    match data.get("tags") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(tags)) => Ok(tags.split_whitespace().map(str::to_string).collect()),
        Some(Value::Array(tags)) => tags
            .iter()
            .map(|tag| tag.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
    }
}
