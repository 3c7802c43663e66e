use serde_json::{json, Map, Value};

use crate::database::models::{Card, Note, NoteType};

/// Bare `{ "id": n }` reference, used when a search isn't preloaded
pub fn id_to_api_value(id: i64) -> Value {
    json!({ "id": id })
}

pub fn ids_to_api_values(ids: &[i64]) -> Vec<Value> {
    ids.iter().copied().map(id_to_api_value).collect()
}

/// Convert a note into the public wire format
/// { id, model, tags, fields }
///
/// `tags` is a single space-joined string. `fields` maps field names to values and is
/// empty when the note's model is gone.
pub fn note_to_api_value(note: &Note, model: Option<&NoteType>) -> Value {
    let mut fields = Map::new();
    if let Some(model) = model {
        for (name, value) in note.named_fields(model) {
            fields.insert(name.to_string(), Value::String(value.to_string()));
        }
    }

    let mut obj = Map::new();
    obj.insert("id".into(), json!(note.id));
    obj.insert(
        "model".into(),
        model.map_or(Value::Null, |m| Value::String(m.name.clone())),
    );
    obj.insert("tags".into(), Value::String(note.tags.join(" ")));
    obj.insert("fields".into(), Value::Object(fields));

    Value::Object(obj)
}

/// Convert a card into the public wire format
/// { id, note_id, deck_id, ord, due }
pub fn card_to_api_value(card: &Card) -> Value {
    json!({
        "id": card.id,
        "note_id": card.note_id,
        "deck_id": card.deck_id,
        "ord": card.ord,
        "due": card.due,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{FieldDef, TemplateDef};

    fn basic() -> NoteType {
        NoteType {
            id: 1,
            name: "Basic".into(),
            fields: vec![
                FieldDef { name: "Front".into(), ord: 0 },
                FieldDef { name: "Back".into(), ord: 1 },
            ],
            templates: vec![TemplateDef { name: "Card 1".into(), ord: 0 }],
        }
    }

    fn note() -> Note {
        Note {
            id: 7,
            model_id: 1,
            fields: vec!["hola".into(), "hello".into()],
            tags: vec!["foo".into(), "bar".into()],
        }
    }

    #[test]
    fn note_has_model_name_joined_tags_and_named_fields() {
        let value = note_to_api_value(&note(), Some(&basic()));
        assert_eq!(
            value,
            json!({
                "id": 7,
                "model": "Basic",
                "tags": "foo bar",
                "fields": { "Front": "hola", "Back": "hello" },
            })
        );
    }

    #[test]
    fn note_without_model_keeps_id_and_tags() {
        let value = note_to_api_value(&note(), None);
        assert_eq!(value["model"], Value::Null);
        assert_eq!(value["tags"], "foo bar");
        assert_eq!(value["fields"], json!({}));
    }

    #[test]
    fn unpreloaded_results_are_id_objects() {
        assert_eq!(
            Value::Array(ids_to_api_values(&[3, 1])),
            json!([{ "id": 3 }, { "id": 1 }])
        );
    }
}
