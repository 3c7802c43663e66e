use futures::FutureExt;
use serde_json::Value;

use crate::api::format;
use crate::database::Collection;
use crate::handlers::utils::last_path_id;
use crate::registry::{HandlerGroup, Operation, OperationError, OperationFuture};
use crate::routing::ResourceType;
use crate::types::RequestData;

pub struct CardHandler;

impl HandlerGroup for CardHandler {
    fn name(&self) -> &'static str {
        "CardHandler"
    }

    fn operations(&self) -> Vec<Operation> {
        vec![Operation::new("index", index)]
    }
}

/// `/collection/{cid}/{type}/{id}/card/{card_id}` → the card
fn index(col: &mut Collection, _data: RequestData, ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let card_id = last_path_id(&ids, ResourceType::Card)?;
        Ok(Some(load_card(col, card_id).await?))
    }
    .boxed()
}

pub(crate) async fn load_card(col: &mut Collection, card_id: i64) -> Result<Value, OperationError> {
    let card = col.get_card(card_id).await?;
    Ok(format::card_to_api_value(&card))
}
