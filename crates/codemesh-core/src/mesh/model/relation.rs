//! Relationship edges of the code knowledge mesh.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::provenance::Provenance;

/// Closed set of relationship kinds between entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    // Structural
    Contains,
    Imports,
    Exports,
    // Inheritance
    Inherits,
    Implements,
    // Usage
    Calls,
    Uses,
    Returns,
    Accepts,
    // Decoration
    Decorates,
    DecoratedBy,
    // API
    Exposes,
    HandledBy,
    // Messaging
    PublishesTo,
    SubscribesTo,
    // Data
    ReadsFrom,
    WritesTo,
    Queries,
    // Cross-service
    CallsService,
    DependsOn,
}

impl RelationKind {
    /// Parse the edge names used in schema documents and discovery output.
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s.to_ascii_uppercase().as_str() {
            "CONTAINS" => Self::Contains,
            "IMPORTS" => Self::Imports,
            "EXPORTS" => Self::Exports,
            "INHERITS" | "EXTENDS" => Self::Inherits,
            "IMPLEMENTS" => Self::Implements,
            "CALLS" => Self::Calls,
            "USES" => Self::Uses,
            "RETURNS" => Self::Returns,
            "ACCEPTS" => Self::Accepts,
            "DECORATES" => Self::Decorates,
            "DECORATED_BY" => Self::DecoratedBy,
            "EXPOSES" => Self::Exposes,
            "HANDLED_BY" => Self::HandledBy,
            "PUBLISHES_TO" => Self::PublishesTo,
            "SUBSCRIBES_TO" => Self::SubscribesTo,
            "READS_FROM" => Self::ReadsFrom,
            "WRITES_TO" => Self::WritesTo,
            "QUERIES" => Self::Queries,
            "CALLS_SERVICE" => Self::CallsService,
            "DEPENDS_ON" => Self::DependsOn,
            _ => return None,
        };
        Some(kind)
    }
}

/// An edge between two entities.
///
/// `from_id`/`to_id` must reference entities that exist in the same committed
/// batch or a prior one; a dangling reference is a data-quality error caught
/// at commit time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    /// Opaque unique key.
    pub id: String,

    /// Relationship kind.
    pub kind: RelationKind,

    /// Source entity id.
    pub from_id: String,

    /// Target entity id.
    pub to_id: String,

    /// Open string-keyed property map.
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,

    /// How this edge was extracted.
    pub provenance: Provenance,
}

impl Relation {
    pub fn new(
        kind: RelationKind,
        from_id: impl Into<String>,
        to_id: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            from_id: from_id.into(),
            to_id: to_id.into(),
            properties: BTreeMap::new(),
            provenance,
        }
    }

    /// Attach a property.
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse() {
        assert_eq!(RelationKind::parse("calls"), Some(RelationKind::Calls));
        assert_eq!(RelationKind::parse("EXTENDS"), Some(RelationKind::Inherits));
        assert_eq!(
            RelationKind::parse("publishes_to"),
            Some(RelationKind::PublishesTo)
        );
        assert_eq!(RelationKind::parse("FRIENDS_WITH"), None);
    }
}
