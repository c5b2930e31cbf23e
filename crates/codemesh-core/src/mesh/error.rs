use thiserror::Error;

/// Errors that can occur in the mesh graph store.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Dangling relationship {relation}: missing endpoint {entity}")]
    DanglingRelation { relation: String, entity: String },

    #[error("Concurrent run chain conflict for {project}/{branch}")]
    ChainConflict { project: String, branch: String },
}
