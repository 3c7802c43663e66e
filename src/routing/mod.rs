// Request routing: everything that runs before a collection is touched.
//
// gate    → transport preconditions (origin allow-list, POST only)
// path    → URL path → (resource type, operation, ids)
// locator → collection id → jailed on-disk collection path

pub mod gate;
pub mod locator;
pub mod path;

pub use gate::{AllowedHosts, GateError, RequestGate};
pub use locator::{CollectionLocator, LocatorError, COLLECTION_FILE};
pub use path::{resolve, PathDescriptor, PathError, ResourceType, DEFAULT_OPERATION};
