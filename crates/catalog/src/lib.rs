pub mod error;
pub mod model;
pub mod probe;
pub mod snapshot;

pub use error::{CatalogError, Result};
pub use model::*;
pub use probe::*;
pub use snapshot::{CatalogConnection, SnapshotId};
