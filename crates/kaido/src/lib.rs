//! # kaido
//!
//! Uniform storage backends behind location strings.
//!
//! A [`Location`] such as `mem://scratch/notes/a.txt` or `/tmp/x` names an
//! entry. The [`Registry`] maps each location to the backend bound under
//! its longest matching prefix, and the backend does the work. Every
//! backend implements the same [`Backend`] contract; extras like rename,
//! watch and truncate are optional capabilities a caller can probe for.
//!
//! Key components:
//!
//! - [`Registry`] - prefix to backend map, longest match wins
//! - [`Backend`] - the contract, with optional capability traits
//! - [`MemoryFs`] - in-memory tree file system
//! - [`LocalFs`] - host file system
//! - [`buffer`] - in-memory handles backends hand out
//! - [`ops`] - copy, move and recursive remove across backends
//!
//! ```
//! use std::sync::Arc;
//! use kaido::{Location, MemoryFs, MemoryFsConfig, Registry};
//!
//! let registry = Arc::new(Registry::new());
//! let _fs = MemoryFs::create(&registry, MemoryFsConfig::default().with_id("docs"));
//!
//! let file = Location::new("mem://docs/hello.txt");
//! file.write_all(&registry, "hi").unwrap();
//! assert_eq!(file.read_all_string(&registry).unwrap(), "hi");
//! ```

pub mod backend;
pub mod backends;
pub mod buffer;
pub mod config;
mod error;
pub mod hash;
mod location;
pub mod ops;
pub mod pattern;
mod registry;
mod types;

pub use backend::{
    Backend, Capability, CopyFile, FileReadWriter, FileReader, FileWriter, ListCallback,
    MakeAllDirs, Move, Owner, Rename, SetPermissions, Symlinks, Touch, Truncate, Watch,
    WatchCallback, WatchHandle,
};
pub use backends::{InvalidFs, LocalFs, MemoryFs};
pub use buffer::{FileBuffer, ReadWriteAllBuffer, ReadonlyBuffer};
pub use config::{LocalFsConfig, MemoryFsConfig, RegistryConfig};
pub use error::{FsError, FsResult};
pub use location::Location;
pub use registry::Registry;
pub use types::{FileInfo, Permissions, RegisteredBackend, WatchEvent, WatchEventKind};
