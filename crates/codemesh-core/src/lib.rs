//! CodeMesh core: a self-improving code knowledge mesh.
//!
//! Extracts a structural graph of code entities and relationships from
//! source repositories, anchors every extraction to the git revision that
//! produced it, and adaptively decides — per pattern, per language — how
//! much expensive verification an extraction needs before being trusted.
//!
//! # Components
//!
//! - [`mesh`] - the typed graph model and its embedded SurrealDB store
//! - [`schema`] - declarative, versioned extraction schema documents
//! - [`trust`] - reliability records and adaptive verification sampling
//! - [`revision`] - git introspection, repo sync, and run history chains
//! - [`router`] - tiered extraction routing (deterministic / assisted / discovery)
//! - [`engine`] - full and incremental extraction passes
//! - [`evolution`] - schema-change evidence queue and health reporting
//! - [`llm`] - the optional escalation capability's model providers

pub mod config;
pub mod engine;
pub mod evolution;
pub mod llm;
pub mod mesh;
pub mod revision;
pub mod router;
pub mod schema;
pub mod trust;

pub use config::Config;
pub use engine::{EngineError, ExtractionEngine, RunRequest, RunSummary};
pub use mesh::{MeshDb, MeshError, MeshStats};
pub use router::{ExtractionRouter, FileExtractionResult, RouterOptions};
pub use schema::SchemaRegistry;
pub use trust::{TrustLedger, TrustStore};
