use futures::FutureExt;

use crate::api::format;
use crate::database::Collection;
use crate::handlers::utils::path_id;
use crate::registry::{HandlerGroup, Operation, OperationFuture};
use crate::routing::ResourceType;
use crate::types::RequestData;

pub struct DeckHandler;

impl HandlerGroup for DeckHandler {
    fn name(&self) -> &'static str {
        "DeckHandler"
    }

    fn operations(&self) -> Vec<Operation> {
        vec![Operation::new("next_card", next_card)]
    }
}

/// Select the deck from the path and hand out its next card, or nothing once the queue is spent
fn next_card(col: &mut Collection, _data: RequestData, ids: Vec<String>) -> OperationFuture<'_> {
    async move {
        let deck_id = path_id(&ids, 1, ResourceType::Deck)?;
        col.select_deck(deck_id).await?;

        let card = col.next_card().await?;
        Ok(card.as_ref().map(format::card_to_api_value))
    }
    .boxed()
}
