use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::StoreError;

/// A model (note type): the field layout and card templates notes are built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteType {
    pub id: i64,
    pub name: String,
    #[serde(rename = "flds")]
    pub fields: Vec<FieldDef>,
    #[serde(rename = "tmpls")]
    pub templates: Vec<TemplateDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub ord: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDef {
    pub name: String,
    pub ord: i64,
}

/// Raw `models` row; field and template names are JSON string arrays
#[derive(Debug, FromRow)]
pub struct NoteTypeRow {
    pub id: i64,
    pub name: String,
    pub flds: String,
    pub tmpls: String,
}

impl TryFrom<NoteTypeRow> for NoteType {
    type Error = StoreError;

    fn try_from(row: NoteTypeRow) -> Result<Self, Self::Error> {
        let fields: Vec<String> = serde_json::from_str(&row.flds)?;
        let templates: Vec<String> = serde_json::from_str(&row.tmpls)?;

        Ok(Self {
            id: row.id,
            name: row.name,
            fields: fields
                .into_iter()
                .zip(0..)
                .map(|(name, ord)| FieldDef { name, ord })
                .collect(),
            templates: templates
                .into_iter()
                .zip(0..)
                .map(|(name, ord)| TemplateDef { name, ord })
                .collect(),
        })
    }
}

impl NoteType {
    pub const DEFAULT_ID: i64 = 1;
    pub const DEFAULT_NAME: &'static str = "Basic";
    pub const DEFAULT_FIELDS: [&'static str; 2] = ["Front", "Back"];
    pub const DEFAULT_TEMPLATES: [&'static str; 1] = ["Card 1"];

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}
