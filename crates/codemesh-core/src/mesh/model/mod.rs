//! Typed graph schema for the code knowledge mesh.
//!
//! The mesh is a property graph: [`Entity`] nodes connected by [`Relation`]
//! edges, every element carrying [`Provenance`] that records which extraction
//! tier produced it and with what confidence.

mod entity;
mod provenance;
mod relation;
mod run;

pub use entity::{Entity, EntityKind, SourceLocation};
pub use provenance::{Provenance, Tier};
pub use relation::{Relation, RelationKind};
pub use run::ExtractionRun;
