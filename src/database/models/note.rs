use sqlx::FromRow;

use super::NoteType;

/// Field values are stored joined by the unit separator, in model field order.
pub const FIELD_SEPARATOR: &str = "\x1f";

/// A note: field values for one model, plus tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: i64,
    pub model_id: i64,
    pub fields: Vec<String>,
    pub tags: Vec<String>,
}

/// Raw `notes` row as stored
#[derive(Debug, FromRow)]
pub struct NoteRow {
    pub id: i64,
    pub mid: i64,
    pub flds: String,
    pub tags: String,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        Self {
            id: row.id,
            model_id: row.mid,
            fields: row.flds.split(FIELD_SEPARATOR).map(str::to_string).collect(),
            tags: split_tags(&row.tags),
        }
    }
}

impl Note {
    /// Pair each field value with its name from `model`.
    pub fn named_fields<'a>(&'a self, model: &'a NoteType) -> impl Iterator<Item = (&'a str, &'a str)> {
        model
            .fields
            .iter()
            .zip(self.fields.iter())
            .map(|(def, value)| (def.name.as_str(), value.as_str()))
    }
}

pub fn join_fields(values: &[String]) -> String {
    values.join(FIELD_SEPARATOR)
}

/// Tags are stored space-padded (" a b ") so `LIKE '% tag %'` matches whole tags.
pub fn join_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        String::new()
    } else {
        format!(" {} ", tags.join(" "))
    }
}

pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split_whitespace().map(str::to_string).collect()
}
