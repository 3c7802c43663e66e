use percent_encoding::percent_decode_str;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operation name used when the path ends on an identifier.
pub const DEFAULT_OPERATION: &str = "index";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("Empty request path")]
    Empty,

    #[error("Path segment is not valid UTF-8 after decoding: {0}")]
    InvalidEncoding(String),

    #[error("Path does not match the resource grammar: {0}")]
    NoMatch(String),
}

/// Kinds of resource addressable in a URL, in grammar order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Collection,
    Model,
    Note,
    Deck,
    Card,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Collection,
        ResourceType::Model,
        ResourceType::Note,
        ResourceType::Deck,
        ResourceType::Card,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Collection => "collection",
            ResourceType::Model => "model",
            ResourceType::Note => "note",
            ResourceType::Deck => "deck",
            ResourceType::Card => "card",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| PathError::NoMatch(s.to_string()))
    }
}

/// One position in the URL grammar. A slot accepts exactly one of its types.
struct Slot(&'static [ResourceType]);

impl Slot {
    fn accepts(&self, segment: &str) -> Option<ResourceType> {
        self.0.iter().copied().find(|ty| ty.as_str() == segment)
    }
}

/// collection → {model | note | deck} → card
const GRAMMAR: [Slot; 3] = [
    Slot(&[ResourceType::Collection]),
    Slot(&[ResourceType::Model, ResourceType::Note, ResourceType::Deck]),
    Slot(&[ResourceType::Card]),
];

/// A resolved request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDescriptor {
    /// Innermost resource type named in the path
    pub resource_type: ResourceType,
    pub operation: String,
    /// One id per consumed type; `ids[0]` is always the collection id
    pub ids: Vec<String>,
}

impl PathDescriptor {
    pub fn collection_id(&self) -> &str {
        &self.ids[0]
    }
}

/// Resolve a URL path against the positional grammar.
///
/// Single greedy pass: at each slot the next segment must name one of the slot's
/// types, and the segment after it is that type's id. The walk stops as soon as
/// fewer than two segments remain, so a trailing segment is always the operation
/// name, even when it happens to spell a type (`/collection/c/deck/d/card` is
/// operation `card` on deck `d`).
pub fn resolve(path: &str) -> Result<PathDescriptor, PathError> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Err(PathError::Empty);
    }

    let segments = trimmed
        .split('/')
        .map(decode_segment)
        .collect::<Result<Vec<_>, _>>()?;

    let mut rest = segments.as_slice();
    let mut resource_type = None;
    let mut ids = Vec::new();

    for slot in &GRAMMAR {
        let Some((head, tail)) = rest.split_first() else {
            break;
        };
        let Some(ty) = slot.accepts(head) else {
            break;
        };
        resource_type = Some(ty);
        rest = tail;

        if let Some((id, tail)) = rest.split_first() {
            ids.push(id.clone());
            rest = tail;
        }

        // no room left for another type/id pair
        if rest.len() < 2 {
            break;
        }
    }

    let resource_type = match resource_type {
        Some(ty) if !ids.is_empty() && rest.len() <= 1 => ty,
        _ => return Err(PathError::NoMatch(path.to_string())),
    };

    let operation = rest
        .first()
        .cloned()
        .unwrap_or_else(|| DEFAULT_OPERATION.to_string());

    Ok(PathDescriptor {
        resource_type,
        operation,
        ids,
    })
}

fn decode_segment(segment: &str) -> Result<String, PathError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| PathError::InvalidEncoding(segment.to_string()))
}
