//! SurrealDB embedded database for the knowledge mesh.

use std::path::Path;

use chrono::{DateTime, Utc};
use surrealdb::engine::local::{Db, RocksDb};
use surrealdb::Surreal;
use tracing::debug;

use super::error::MeshError;
use super::model::{Entity, ExtractionRun, Relation};

/// Per-project mesh statistics.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct MeshStats {
    pub entities: usize,
    pub relations: usize,
    pub runs: usize,
}

/// Storage row for an extraction run.
///
/// The domain type's opaque id is stored as `run_id` so it never collides
/// with SurrealDB's own record id.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct RunRow {
    run_id: String,
    project_id: String,
    branch: String,
    commit_sha: String,
    commit_message: String,
    author: String,
    committed_at: DateTime<Utc>,
    run_at: DateTime<Utc>,
    files_extracted: u64,
    total_nodes: u64,
    total_edges: u64,
    tags: Vec<String>,
    clean: bool,
    remote_url: Option<String>,
    complete: bool,
    /// Absent (NONE) while the run is the chain head; comparing against
    /// NONE in queries relies on the field being omitted, not null.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    next_run_id: Option<String>,
}

impl RunRow {
    fn from_run(run: &ExtractionRun) -> Self {
        Self {
            run_id: run.id.clone(),
            project_id: run.project_id.clone(),
            branch: run.branch.clone(),
            commit_sha: run.commit_sha.clone(),
            commit_message: run.commit_message.clone(),
            author: run.author.clone(),
            committed_at: run.committed_at,
            run_at: run.run_at,
            files_extracted: run.files_extracted,
            total_nodes: run.total_nodes,
            total_edges: run.total_edges,
            tags: run.tags.clone(),
            clean: run.clean,
            remote_url: run.remote_url.clone(),
            complete: run.complete,
            next_run_id: None,
        }
    }

    fn into_run(self) -> ExtractionRun {
        ExtractionRun {
            id: self.run_id,
            project_id: self.project_id,
            branch: self.branch,
            commit_sha: self.commit_sha,
            commit_message: self.commit_message,
            author: self.author,
            committed_at: self.committed_at,
            run_at: self.run_at,
            files_extracted: self.files_extracted,
            total_nodes: self.total_nodes,
            total_edges: self.total_edges,
            tags: self.tags,
            clean: self.clean,
            remote_url: self.remote_url,
            complete: self.complete,
        }
    }
}

/// Database connection for the knowledge mesh.
///
/// The store is the single source of truth for committed entities and
/// edges. Entities, relations, and runs are upserted by their opaque ids
/// (unique indexes); run records additionally chain through `next_run_id`.
pub struct MeshDb {
    db: Surreal<Db>,
}

impl MeshDb {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self, MeshError> {
        let db = Surreal::new::<RocksDb>(path).await?;
        db.use_ns("codemesh").use_db("mesh").await?;

        Ok(Self { db })
    }

    /// Initialize the database schema.
    pub async fn initialize_schema(&self) -> Result<(), MeshError> {
        // Entity nodes
        self.db
            .query(
                r#"
                DEFINE TABLE entity SCHEMALESS;
                DEFINE FIELD entity_id ON entity TYPE string;
                DEFINE FIELD kind ON entity TYPE string;
                DEFINE FIELD name ON entity TYPE string;
                DEFINE FIELD project_id ON entity TYPE string;
                DEFINE FIELD file_path ON entity TYPE string;
                DEFINE INDEX entity_id_unique ON entity FIELDS entity_id UNIQUE;
                DEFINE INDEX entity_project ON entity FIELDS project_id;
                DEFINE INDEX entity_file ON entity FIELDS project_id, file_path;
                DEFINE INDEX entity_name ON entity FIELDS name;
                "#,
            )
            .await?;

        // Relationship edges, stored as records keyed by their endpoints
        self.db
            .query(
                r#"
                DEFINE TABLE relation SCHEMALESS;
                DEFINE FIELD relation_id ON relation TYPE string;
                DEFINE FIELD kind ON relation TYPE string;
                DEFINE FIELD from_id ON relation TYPE string;
                DEFINE FIELD to_id ON relation TYPE string;
                DEFINE INDEX relation_id_unique ON relation FIELDS relation_id UNIQUE;
                DEFINE INDEX relation_from ON relation FIELDS from_id;
                DEFINE INDEX relation_to ON relation FIELDS to_id;
                "#,
            )
            .await?;

        // Extraction run history
        self.db
            .query(
                r#"
                DEFINE TABLE extraction_run SCHEMALESS;
                DEFINE FIELD run_id ON extraction_run TYPE string;
                DEFINE FIELD project_id ON extraction_run TYPE string;
                DEFINE FIELD branch ON extraction_run TYPE string;
                DEFINE FIELD commit_sha ON extraction_run TYPE string;
                DEFINE FIELD next_run_id ON extraction_run TYPE option<string>;
                DEFINE INDEX run_id_unique ON extraction_run FIELDS run_id UNIQUE;
                DEFINE INDEX run_project_branch ON extraction_run FIELDS project_id, branch;
                DEFINE INDEX run_commit ON extraction_run FIELDS commit_sha;
                "#,
            )
            .await?;

        // Metadata
        self.db
            .query(
                r#"
                DEFINE TABLE metadata SCHEMAFULL;
                DEFINE FIELD key ON metadata TYPE string;
                DEFINE FIELD value ON metadata TYPE any;
                DEFINE INDEX metadata_key ON metadata FIELDS key UNIQUE;

                UPSERT metadata:initialized SET key = 'initialized', value = true;
                UPSERT metadata:schema_version SET key = 'schema_version', value = '1.0';
                "#,
            )
            .await?;

        Ok(())
    }

    /// Check if the database has been initialized.
    pub async fn is_initialized(&self) -> Result<bool, MeshError> {
        let result: Option<serde_json::Value> = self
            .db
            .query("SELECT value FROM metadata WHERE key = 'initialized'")
            .await?
            .take(0)?;
        Ok(result.is_some())
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Insert or replace an entity by its opaque id.
    pub async fn upsert_entity(&self, entity: &Entity) -> Result<(), MeshError> {
        let mut content = serde_json::to_value(entity)?;
        if let Some(map) = content.as_object_mut() {
            // The opaque id lives in entity_id; SurrealDB assigns its own
            // record id. Flatten the path for the (project, file) index.
            if let Some(id) = map.remove("id") {
                map.insert("entity_id".into(), id);
            }
            map.insert(
                "file_path".into(),
                serde_json::json!(entity.location.file_path),
            );
        }

        self.db
            .query("DELETE entity WHERE entity_id = $id")
            .bind(("id", entity.id.clone()))
            .await?;
        let _: Option<serde_json::Value> = self.db.create("entity").content(content).await?;
        Ok(())
    }

    /// Whether an entity with this id has been committed.
    pub async fn entity_exists(&self, entity_id: &str) -> Result<bool, MeshError> {
        let result: Option<serde_json::Value> = self
            .db
            .query("SELECT entity_id FROM entity WHERE entity_id = $id LIMIT 1")
            .bind(("id", entity_id.to_string()))
            .await?
            .take(0)?;
        Ok(result.is_some())
    }

    /// All entity ids extracted from one file of a project.
    pub async fn file_entity_ids(
        &self,
        project_id: &str,
        file_path: &str,
    ) -> Result<Vec<String>, MeshError> {
        #[derive(serde::Deserialize)]
        struct IdRow {
            entity_id: String,
        }

        let rows: Vec<IdRow> = self
            .db
            .query("SELECT entity_id FROM entity WHERE project_id = $project AND file_path = $path")
            .bind(("project", project_id.to_string()))
            .bind(("path", file_path.to_string()))
            .await?
            .take(0)?;
        Ok(rows.into_iter().map(|r| r.entity_id).collect())
    }

    /// Remove a file's entities and every relation touching them.
    pub async fn remove_file_entities(
        &self,
        project_id: &str,
        file_path: &str,
    ) -> Result<(), MeshError> {
        let ids = self.file_entity_ids(project_id, file_path).await?;
        for id in &ids {
            self.db
                .query("DELETE relation WHERE from_id = $id OR to_id = $id")
                .bind(("id", id.clone()))
                .await?;
        }
        self.db
            .query("DELETE entity WHERE project_id = $project AND file_path = $path")
            .bind(("project", project_id.to_string()))
            .bind(("path", file_path.to_string()))
            .await?;
        Ok(())
    }

    /// Re-point a file's entities at a new path, preserving their ids.
    ///
    /// Used for high-similarity renames: a structural move, not a
    /// delete+create, so graph identity survives pure renames.
    pub async fn move_file_entities(
        &self,
        project_id: &str,
        old_path: &str,
        new_path: &str,
    ) -> Result<usize, MeshError> {
        let moved: Vec<serde_json::Value> = self
            .db
            .query(
                "UPDATE entity SET file_path = $new, location.file_path = $new \
                 WHERE project_id = $project AND file_path = $old",
            )
            .bind(("project", project_id.to_string()))
            .bind(("old", old_path.to_string()))
            .bind(("new", new_path.to_string()))
            .await?
            .take(0)?;

        debug!(project_id, old_path, new_path, count = moved.len(), "moved file entities");
        Ok(moved.len())
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Insert or replace a relation by its opaque id.
    ///
    /// Both endpoints must already exist in the store; a missing one is a
    /// [`MeshError::DanglingRelation`] the caller logs and skips.
    pub async fn upsert_relation(&self, relation: &Relation) -> Result<(), MeshError> {
        for endpoint in [&relation.from_id, &relation.to_id] {
            if !self.entity_exists(endpoint).await? {
                return Err(MeshError::DanglingRelation {
                    relation: relation.id.clone(),
                    entity: endpoint.clone(),
                });
            }
        }

        let mut content = serde_json::to_value(relation)?;
        if let Some(map) = content.as_object_mut() {
            if let Some(id) = map.remove("id") {
                map.insert("relation_id".into(), id);
            }
        }

        self.db
            .query("DELETE relation WHERE relation_id = $id")
            .bind(("id", relation.id.clone()))
            .await?;
        let _: Option<serde_json::Value> = self.db.create("relation").content(content).await?;
        Ok(())
    }

    // =========================================================================
    // Extraction runs
    // =========================================================================

    /// Persist a run record and link it from the previous run of the same
    /// (project, branch).
    ///
    /// The lookup-link-create sequence runs inside one SurrealDB transaction
    /// so two concurrent runs on the same branch cannot fork the chain: the
    /// link is only written while the previous head still has no outgoing
    /// "next" edge.
    pub async fn append_run(&self, run: &ExtractionRun) -> Result<(), MeshError> {
        let previous = self.latest_run(&run.project_id, &run.branch).await?;
        let row = RunRow::from_run(run);
        let content = serde_json::to_value(&row)?;

        match previous {
            None => {
                // Creating the chain root is guarded the same way: if a
                // concurrent run already created one, this append loses.
                let response = self
                    .db
                    .query(
                        r#"
                        BEGIN TRANSACTION;
                        LET $existing = (
                            SELECT run_id FROM extraction_run
                            WHERE project_id = $project AND branch = $branch LIMIT 1
                        );
                        IF array::len($existing) > 0 { THROW "run chain root exists" };
                        CREATE extraction_run CONTENT $record;
                        COMMIT TRANSACTION;
                        "#,
                    )
                    .bind(("project", run.project_id.clone()))
                    .bind(("branch", run.branch.clone()))
                    .bind(("record", content))
                    .await?;

                if let Err(e) = response.check() {
                    debug!(error = %e, "run chain root creation rejected");
                    return Err(MeshError::ChainConflict {
                        project: run.project_id.clone(),
                        branch: run.branch.clone(),
                    });
                }
            }
            Some(prev) => {
                let response = self
                    .db
                    .query(
                        r#"
                        BEGIN TRANSACTION;
                        LET $head = (
                            SELECT run_id FROM extraction_run
                            WHERE run_id = $prev_id AND next_run_id = NONE
                        );
                        IF array::len($head) == 0 { THROW "run chain moved" };
                        UPDATE extraction_run SET next_run_id = $new_id WHERE run_id = $prev_id;
                        CREATE extraction_run CONTENT $record;
                        COMMIT TRANSACTION;
                        "#,
                    )
                    .bind(("prev_id", prev.id.clone()))
                    .bind(("new_id", run.id.clone()))
                    .bind(("record", content))
                    .await?;

                if let Err(e) = response.check() {
                    debug!(error = %e, "run chain append rejected");
                    return Err(MeshError::ChainConflict {
                        project: run.project_id.clone(),
                        branch: run.branch.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// The most recent run for a (project, branch): the chain head, i.e.
    /// the one run with no outgoing "next" edge.
    pub async fn latest_run(
        &self,
        project_id: &str,
        branch: &str,
    ) -> Result<Option<ExtractionRun>, MeshError> {
        let row: Option<RunRow> = self
            .db
            .query(
                "SELECT * OMIT id FROM extraction_run \
                 WHERE project_id = $project AND branch = $branch AND next_run_id = NONE \
                 ORDER BY run_at DESC LIMIT 1",
            )
            .bind(("project", project_id.to_string()))
            .bind(("branch", branch.to_string()))
            .await?
            .take(0)?;
        Ok(row.map(RunRow::into_run))
    }

    /// Look up a run by commit sha.
    pub async fn run_at_commit(
        &self,
        project_id: &str,
        commit_sha: &str,
    ) -> Result<Option<ExtractionRun>, MeshError> {
        let row: Option<RunRow> = self
            .db
            .query(
                "SELECT * OMIT id FROM extraction_run \
                 WHERE project_id = $project AND commit_sha = $sha \
                 ORDER BY run_at DESC LIMIT 1",
            )
            .bind(("project", project_id.to_string()))
            .bind(("sha", commit_sha.to_string()))
            .await?
            .take(0)?;
        Ok(row.map(RunRow::into_run))
    }

    /// Ordered run history for a (project, branch): oldest first, walking
    /// "next" edges from the chain root.
    pub async fn run_history(
        &self,
        project_id: &str,
        branch: &str,
    ) -> Result<Vec<ExtractionRun>, MeshError> {
        let rows: Vec<RunRow> = self
            .db
            .query(
                "SELECT * OMIT id FROM extraction_run \
                 WHERE project_id = $project AND branch = $branch",
            )
            .bind(("project", project_id.to_string()))
            .bind(("branch", branch.to_string()))
            .await?
            .take(0)?;

        // Root = the run nothing links to.
        let linked: std::collections::HashSet<String> =
            rows.iter().filter_map(|r| r.next_run_id.clone()).collect();
        let mut by_id: std::collections::HashMap<String, RunRow> = rows
            .into_iter()
            .map(|r| (r.run_id.clone(), r))
            .collect();

        let Some(root_id) = by_id.keys().find(|id| !linked.contains(*id)).cloned() else {
            return Ok(Vec::new());
        };

        let mut history = Vec::with_capacity(by_id.len());
        let mut cursor = Some(root_id);
        while let Some(id) = cursor {
            match by_id.remove(&id) {
                Some(row) => {
                    cursor = row.next_run_id.clone();
                    history.push(row.into_run());
                }
                None => break,
            }
        }
        Ok(history)
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Mesh statistics for one project.
    pub async fn stats(&self, project_id: &str) -> Result<MeshStats, MeshError> {
        #[derive(serde::Deserialize)]
        struct CountResult {
            count: i64,
        }

        let entities: Option<CountResult> = self
            .db
            .query("SELECT count() FROM entity WHERE project_id = $project GROUP ALL")
            .bind(("project", project_id.to_string()))
            .await?
            .take(0)?;
        let relations: Option<CountResult> = self
            .db
            .query("SELECT count() FROM relation GROUP ALL")
            .await?
            .take(0)?;
        let runs: Option<CountResult> = self
            .db
            .query("SELECT count() FROM extraction_run WHERE project_id = $project GROUP ALL")
            .bind(("project", project_id.to_string()))
            .await?
            .take(0)?;

        Ok(MeshStats {
            entities: entities.map(|r| r.count as usize).unwrap_or(0),
            relations: relations.map(|r| r.count as usize).unwrap_or(0),
            runs: runs.map(|r| r.count as usize).unwrap_or(0),
        })
    }
}
