// handlers/mod.rs - default handler groups, one per resource type
//
//   collection → CollectionHandler   /collection/{cid}/{op}
//   model      → ModelHandler        /collection/{cid}/model/{mid}/{op}
//   note       → NoteHandler         /collection/{cid}/note/{nid}/{op}
//   deck       → DeckHandler         /collection/{cid}/deck/{did}/{op}
//   card       → CardHandler         /collection/{cid}/{type}/{id}/card/{card_id}/{op}

pub mod card;
pub mod collection;
pub mod deck;
pub mod model;
pub mod note;
pub mod utils;

pub use card::CardHandler;
pub use collection::CollectionHandler;
pub use deck::DeckHandler;
pub use model::ModelHandler;
pub use note::NoteHandler;

use crate::registry::{HandlerRegistry, RegistryError};
use crate::routing::ResourceType;

/// Register the built-in groups for every resource type
pub fn register_defaults(registry: &mut HandlerRegistry) -> Result<(), RegistryError> {
    registry.register_group(ResourceType::Collection, &CollectionHandler)?;
    registry.register_group(ResourceType::Model, &ModelHandler)?;
    registry.register_group(ResourceType::Note, &NoteHandler)?;
    registry.register_group(ResourceType::Deck, &DeckHandler)?;
    registry.register_group(ResourceType::Card, &CardHandler)?;
    Ok(())
}
