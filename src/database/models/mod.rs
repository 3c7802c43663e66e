pub mod card;
pub mod deck;
pub mod note;
pub mod note_type;

pub use card::{Card, CardQueue};
pub use deck::Deck;
pub use note::Note;
pub use note_type::{FieldDef, NoteType, TemplateDef};
