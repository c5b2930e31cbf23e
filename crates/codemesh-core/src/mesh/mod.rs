//! The code knowledge mesh: typed graph model and its embedded store.
//!
//! # Components
//!
//! - [`model`] - Entities, relationships, provenance, run records
//! - [`MeshDb`] - SurrealDB embedded database (RocksDB persistence)
//!
//! # Storage
//!
//! Uses SurrealDB embedded with RocksDB persistence. Stores:
//! - **Entities**: typed code elements with source locations and provenance
//! - **Relations**: typed edges, endpoint-validated at commit
//! - **Runs**: per-branch linked chains of extraction history

mod db;
mod error;
pub mod model;

pub use db::{MeshDb, MeshStats};
pub use error::MeshError;
