use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// File name of the store inside each collection directory.
pub const COLLECTION_FILE: &str = "collection.anki2";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocatorError {
    #[error("Empty collection identifier")]
    Empty,

    #[error("\"{0}\" is not a valid collection")]
    InvalidIdentifier(String),

    #[error("\"{0}\" escapes the data root")]
    OutsideRoot(String),
}

/// Maps collection ids to store files jailed under `data_root`.
#[derive(Debug, Clone)]
pub struct CollectionLocator {
    data_root: PathBuf,
}

impl CollectionLocator {
    /// `data_root` should be absolute; it is normalized lexically here.
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        Self {
            data_root: normalize(data_root.as_ref()),
        }
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Resolve `collection_id` to `<data_root>/<collection_id>/collection.anki2`.
    ///
    /// The identifier is rejected outright if it carries `..`, a root, a drive prefix
    /// or a NUL byte, and the normalized result must still sit strictly below the
    /// data root (compared component-wise, so `/data` never matches `/data2`).
    ///
    /// Identifiers that normalize to nothing, such as `.` or `./`, are also rejected even
    /// though they contain no `..`: they would place the store file directly in the data
    /// root rather than in a collection directory of its own.
    pub fn locate(&self, collection_id: &str) -> Result<PathBuf, LocatorError> {
        if collection_id.is_empty() {
            return Err(LocatorError::Empty);
        }
        if collection_id.contains('\0') {
            return Err(LocatorError::InvalidIdentifier(collection_id.to_string()));
        }

        let escapes = Path::new(collection_id).components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(LocatorError::OutsideRoot(collection_id.to_string()));
        }

        let path = normalize(&self.data_root.join(collection_id).join(COLLECTION_FILE));
        if !path.starts_with(&self.data_root) || path.parent() == Some(self.data_root.as_path()) {
            return Err(LocatorError::OutsideRoot(collection_id.to_string()));
        }

        Ok(path)
    }
}

/// Lexical normalization: drops `.`, folds `..` into its parent, never touches disk.
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(normalized.components().next_back(), Some(Component::Normal(_))) {
                    normalized.pop();
                } else if !normalized.has_root() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}
