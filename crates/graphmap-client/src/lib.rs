//! graphmap-client: NebulaGraph sessions, schema management, and typed reads/writes.
//!
//! All graph operations hang off [`GraphClient`]:
//! - `client`: lazy connection, bounded session pool, scoped [`Session`] guards
//! - `schema`: namespaces, tags, edge types, indexes
//! - `mutations`: vertex/edge inserts and updates under retry
//! - `queries`: typed vertex fetches
//!
//! The wire protocol sits behind the [`transport`] traits. [`nebula`] speaks
//! it to a graphd server over TCP; with the `memory` feature,
//! `memory::MemoryGraph` runs statements in-process.

pub mod client;
#[cfg(feature = "memory")]
pub mod memory;
pub mod mutations;
pub mod nebula;
pub mod outcome;
pub mod queries;
pub mod retry;
pub mod schema;
pub mod statements;
pub mod transport;

pub use client::{DropFailure, GraphClient, GraphError, Session};
#[cfg(feature = "memory")]
pub use memory::MemoryGraph;
pub use nebula::NebulaDialer;
pub use outcome::Outcome;
pub use queries::Vertex;
pub use schema::{SpaceOptions, DEFAULT_INDEX_LENGTH};
pub use transport::{
    Cell, Dialer, GraphService, GraphSession, ResultSet, ServerError, TransportError,
};
