//! Entity nodes of the code knowledge mesh.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::provenance::Provenance;

/// Closed set of code-element kinds the mesh recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Module,
    Class,
    Interface,
    Function,
    Method,
    Variable,
    Import,
    Decorator,
    ApiEndpoint,
    ApiParameter,
    ApiResponse,
    Queue,
    Topic,
    Consumer,
    Producer,
    Database,
    Table,
    Column,
    Model,
    ExternalService,
    ConfigValue,
}

impl EntityKind {
    /// Parse the kind names used in schema documents and discovery output.
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "file" => Self::File,
            "module" => Self::Module,
            "class" | "struct" => Self::Class,
            "interface" | "trait" => Self::Interface,
            "function" => Self::Function,
            "method" => Self::Method,
            "variable" | "constant" => Self::Variable,
            "import" => Self::Import,
            "decorator" | "annotation" => Self::Decorator,
            "api_endpoint" | "endpoint" => Self::ApiEndpoint,
            "api_parameter" => Self::ApiParameter,
            "api_response" => Self::ApiResponse,
            "queue" => Self::Queue,
            "topic" => Self::Topic,
            "consumer" => Self::Consumer,
            "producer" => Self::Producer,
            "database" => Self::Database,
            "table" => Self::Table,
            "column" => Self::Column,
            "model" => Self::Model,
            "external_service" | "service" => Self::ExternalService,
            "config_value" | "config" => Self::ConfigValue,
            _ => return None,
        };
        Some(kind)
    }
}

/// Where in a source file an entity was found.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Relative path from project root.
    pub file_path: String,
    /// 1-based start line.
    pub start_line: u32,
    /// 1-based end line (inclusive).
    pub end_line: u32,
    /// Start column, when the extractor knows it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_column: Option<u32>,
    /// End column, when the extractor knows it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_column: Option<u32>,
}

impl SourceLocation {
    pub fn new(file_path: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            file_path: file_path.into(),
            start_line,
            end_line,
            start_column: None,
            end_column: None,
        }
    }
}

/// A node in the knowledge mesh.
///
/// `id` is an opaque key, unique within a project. The kind constrains which
/// properties are semantically meaningful; coherence is validated at
/// construction, not enforced structurally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Opaque unique key.
    pub id: String,

    /// What kind of code element this is.
    pub kind: EntityKind,

    /// Display name (function name, class name, endpoint path, ...).
    pub name: String,

    /// Open string-keyed property map.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,

    /// Source span this entity was extracted from.
    pub location: SourceLocation,

    /// Owning project.
    pub project_id: String,

    /// How this entity was extracted.
    pub provenance: Provenance,
}

impl Entity {
    /// Create an entity with a fresh opaque id.
    ///
    /// Returns an error string when the name is empty or when kind-specific
    /// property expectations are violated (e.g. an `ApiEndpoint` without a
    /// `method` is accepted, but an empty-named one is not).
    pub fn new(
        kind: EntityKind,
        name: impl Into<String>,
        location: SourceLocation,
        project_id: impl Into<String>,
        provenance: Provenance,
    ) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(format!("entity of kind {kind:?} has an empty name"));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            kind,
            name,
            properties: BTreeMap::new(),
            location,
            project_id: project_id.into(),
            provenance,
        })
    }

    /// Attach a property.
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// The placeholder entity recorded for a file no schema matched.
    pub fn unmatched_file(path: &str, project_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: EntityKind::File,
            name: path.to_string(),
            properties: BTreeMap::new(),
            location: SourceLocation::new(path, 1, 1),
            project_id: project_id.to_string(),
            provenance: Provenance::unmatched(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_are_unique() {
        let loc = SourceLocation::new("src/lib.rs", 1, 10);
        let a = Entity::new(
            EntityKind::Function,
            "parse",
            loc.clone(),
            "proj",
            Provenance::deterministic("base-rust", 0.9),
        )
        .unwrap();
        let b = Entity::new(
            EntityKind::Function,
            "parse",
            loc,
            "proj",
            Provenance::deterministic("base-rust", 0.9),
        )
        .unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_empty_name_rejected() {
        let loc = SourceLocation::new("src/lib.rs", 1, 1);
        let result = Entity::new(
            EntityKind::Class,
            "  ",
            loc,
            "proj",
            Provenance::deterministic("base-rust", 0.9),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_kind_parse_aliases() {
        assert_eq!(EntityKind::parse("struct"), Some(EntityKind::Class));
        assert_eq!(EntityKind::parse("Trait"), Some(EntityKind::Interface));
        assert_eq!(EntityKind::parse("endpoint"), Some(EntityKind::ApiEndpoint));
        assert_eq!(EntityKind::parse("nonsense"), None);
    }
}
