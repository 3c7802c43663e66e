use futures::FutureExt;
use serde_json::Value;

use crate::api::format;
use crate::database::Collection;
use crate::handlers::utils::path_id;
use crate::registry::{HandlerGroup, Operation, OperationError, OperationFuture};
use crate::routing::ResourceType;
use crate::types::RequestData;

pub struct NoteHandler;

impl HandlerGroup for NoteHandler {
    fn name(&self) -> &'static str {
        "NoteHandler"
    }

    fn operations(&self) -> Vec<Operation> {
        vec![Operation::new("index", index)]
    }
}

/// `/collection/{cid}/note/{nid}` → the note with its model name, tags and fields
fn index(col: &mut Collection, _data: RequestData, ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let note_id = path_id(&ids, 1, ResourceType::Note)?;
        Ok(Some(load_note(col, note_id).await?))
    }
    .boxed()
}

/// Fetch a note and its model, formatted for the wire
pub(crate) async fn load_note(col: &mut Collection, note_id: i64) -> Result<Value, OperationError> {
    let note = col.get_note(note_id).await?;
    let model = col.model_by_id(note.model_id).await?;
    Ok(format::note_to_api_value(&note, model.as_ref()))
}
