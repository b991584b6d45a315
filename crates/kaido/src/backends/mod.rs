//! Built-in backends.
//!
//! - [`MemoryFs`] - in-memory tree, one per `mem://<id>` prefix
//! - [`LocalFs`] - the host file system under `file://` and bare paths
//! - [`InvalidFs`] - sentinel for the empty location

pub mod invalid;
pub mod local;
pub mod memory;

pub use invalid::{INVALID_PREFIX, InvalidFs};
pub use local::{LOCAL_PREFIX, LocalFs};
pub use memory::{MEMORY_SCHEME, MemoryFs};
