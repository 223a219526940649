//! redb-backed persistence for `procmem-core`'s hypergraph and entity
//! registry.
//!
//! The core treats the graph and registry as pure in-memory structures;
//! this crate is the optional durability layer that snapshots them to an
//! embedded database and rebuilds them on startup. Same table-per-entity
//! layout, same `tokio::spawn_blocking` wrapper around synchronous redb
//! transactions, same postcard row encoding as a redb-backed storage
//! crate built the conventional way.

mod error;
mod registry;
mod snapshot;
mod tables;

pub use error::Error as StorageError;
pub use registry::RegistryPersistence;
pub use snapshot::GraphPersistence;
