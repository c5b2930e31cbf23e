//! Schema registry: loads, indexes, and hot-replaces schema documents.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use super::{CompiledSchema, SchemaDocument, SchemaError};

/// Registry of compiled extraction schemas, keyed by schema name.
///
/// The registry is shared across concurrently processed files; `reload`
/// swaps the whole schema set atomically so in-flight extractions keep the
/// set they started with.
#[derive(Debug)]
pub struct SchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<CompiledSchema>>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Load every `.yaml`/`.yml` document under a directory.
    ///
    /// A missing directory yields an empty registry (extraction still runs,
    /// every file falls through to the unmatched path). An unparseable or
    /// uncompilable document is an error: schemas are configuration, and
    /// half-loading them silently would corrupt routing decisions.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let registry = Self::new();
        let dir = dir.as_ref();
        if !dir.exists() {
            debug!(dir = %dir.display(), "schema directory missing, starting empty");
            return Ok(registry);
        }

        let entries = std::fs::read_dir(dir).map_err(|source| SchemaError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| SchemaError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            let is_yaml = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }

            let display = path.display().to_string();
            let yaml = std::fs::read_to_string(&path).map_err(|source| SchemaError::Io {
                path: display.clone(),
                source,
            })?;
            let document = SchemaDocument::from_yaml(&display, &yaml)?;
            registry.insert(document)?;
        }

        Ok(registry)
    }

    /// Compile and insert a document. Fails on duplicate names.
    pub fn insert(&self, document: SchemaDocument) -> Result<(), SchemaError> {
        let name = document.name.clone();
        let compiled = Arc::new(CompiledSchema::compile(document)?);

        let mut schemas = self.schemas.write().expect("schema registry lock poisoned");
        if schemas.contains_key(&name) {
            return Err(SchemaError::DuplicateName(name));
        }
        debug!(schema = %name, "registered extraction schema");
        schemas.insert(name, compiled);
        Ok(())
    }

    /// Replace the registry contents with freshly loaded documents.
    ///
    /// On error the previous schema set is kept, so a bad reload never
    /// degrades a running service.
    pub fn reload(&self, dir: impl AsRef<Path>) -> Result<usize, SchemaError> {
        let fresh = Self::load_dir(dir)?;
        let fresh_schemas = fresh
            .schemas
            .into_inner()
            .expect("schema registry lock poisoned");
        let count = fresh_schemas.len();

        let mut schemas = self.schemas.write().expect("schema registry lock poisoned");
        *schemas = fresh_schemas;
        Ok(count)
    }

    /// Look up a schema by name.
    pub fn get(&self, name: &str) -> Option<Arc<CompiledSchema>> {
        self.schemas
            .read()
            .expect("schema registry lock poisoned")
            .get(name)
            .cloned()
    }

    /// All schemas whose detection predicate matches the file.
    pub fn matching_schemas(&self, path: &str, content: &str) -> Vec<Arc<CompiledSchema>> {
        let schemas = self.schemas.read().expect("schema registry lock poisoned");
        let mut matched: Vec<Arc<CompiledSchema>> = schemas
            .values()
            .filter(|s| s.matches(path, content))
            .cloned()
            .collect();
        // Deterministic order regardless of map iteration.
        matched.sort_by(|a, b| a.document.name.cmp(&b.document.name));

        if matched.is_empty() {
            warn!(path, "no schema matched file");
        }
        matched
    }

    /// Number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas
            .read()
            .expect("schema registry lock poisoned")
            .len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all registered schemas, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .schemas
            .read()
            .expect("schema registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
