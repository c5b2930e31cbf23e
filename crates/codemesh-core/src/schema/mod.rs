//! Declarative extraction schemas.
//!
//! A schema document is versioned data, not code: it describes how to
//! recognize entities and relationships in one language or framework via
//! detection predicates and regex pattern rules. Adding a language never
//! requires recompiling the router — documents are YAML files loaded into
//! the [`SchemaRegistry`] at startup and hot-replaceable with
//! [`SchemaRegistry::reload`].

mod registry;

pub use registry::SchemaRegistry;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mesh::model::{EntityKind, RelationKind};

/// Errors raised while loading or compiling schema documents.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Failed to read schema file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse schema document {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Schema '{schema}' pattern '{pattern}': invalid regex: {source}")]
    InvalidRegex {
        schema: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Schema '{schema}': invalid glob '{pattern}': {source}")]
    InvalidGlob {
        schema: String,
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Schema '{schema}' pattern '{pattern}': unknown kind '{kind}'")]
    UnknownKind {
        schema: String,
        pattern: String,
        kind: String,
    },

    #[error("Duplicate schema name '{0}'")]
    DuplicateName(String),
}

/// Detection predicate: decides whether a schema applies to a file.
///
/// A schema matches a file when ANY of its predicates hit: a path glob,
/// an import signature found in the content, or a content pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Detection {
    /// Path globs, e.g. `**/*.rs` or `src/api/**`.
    pub path_globs: Vec<String>,

    /// Regexes matched against the file content's import section
    /// (the first 50 lines), e.g. `^use actix_web`.
    pub import_signatures: Vec<String>,

    /// Regexes matched against the whole content.
    pub content_patterns: Vec<String>,
}

/// A single node-producing pattern rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternRule {
    /// Rule name, unique within its schema. This is the key trust records
    /// are kept under.
    pub name: String,

    /// Multi-line regex with named or positional capture groups.
    pub regex: String,

    /// Entity kind this rule produces (schema-document spelling,
    /// resolved via [`EntityKind::parse`] at load).
    pub kind: String,

    /// Capture group holding the entity name (1-based index).
    #[serde(default = "default_name_group")]
    pub name_group: usize,

    /// Confidence attached to matches of this rule.
    #[serde(default = "default_confidence")]
    pub confidence_boost: f64,

    /// Optional capture group -> property name mapping.
    #[serde(default)]
    pub property_groups: std::collections::BTreeMap<String, usize>,
}

fn default_name_group() -> usize {
    1
}

fn default_confidence() -> f64 {
    0.9
}

/// A single edge-producing pattern rule.
///
/// Both endpoints are named by capture group; the router resolves them to
/// entities extracted from the same file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgePatternRule {
    /// Rule name, unique within its schema.
    pub name: String,

    /// Multi-line regex.
    pub regex: String,

    /// Relationship kind (schema-document spelling).
    pub kind: String,

    /// Capture group holding the source entity name.
    #[serde(default = "default_name_group")]
    pub from_group: usize,

    /// Capture group holding the target entity name. Zero means the
    /// enclosing file entity is the target.
    #[serde(default)]
    pub to_group: usize,

    /// Confidence attached to matches of this rule.
    #[serde(default = "default_confidence")]
    pub confidence_boost: f64,
}

/// A declarative, versioned extraction schema document as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Schema name, e.g. `base-python` or `fastapi`.
    pub name: String,

    /// Semantic version of the document.
    pub version: String,

    /// Language the schema targets, e.g. `python`.
    pub language: String,

    /// Optional framework, e.g. `fastapi`.
    #[serde(default)]
    pub framework: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// When this schema applies.
    #[serde(default)]
    pub detection: Detection,

    /// Node-producing rules.
    #[serde(default)]
    pub node_patterns: Vec<PatternRule>,

    /// Edge-producing rules.
    #[serde(default)]
    pub edge_patterns: Vec<EdgePatternRule>,
}

impl SchemaDocument {
    /// Parse a document from YAML.
    pub fn from_yaml(path: &str, yaml: &str) -> Result<Self, SchemaError> {
        serde_yaml::from_str(yaml).map_err(|source| SchemaError::Parse {
            path: path.to_string(),
            source,
        })
    }
}

/// A schema document with its regexes compiled, ready for matching.
#[derive(Debug)]
pub struct CompiledSchema {
    pub document: SchemaDocument,
    pub path_globs: globset::GlobSet,
    pub import_signatures: Vec<Regex>,
    pub content_patterns: Vec<Regex>,
    pub node_rules: Vec<CompiledPatternRule>,
    pub edge_rules: Vec<CompiledEdgeRule>,
}

/// A compiled node rule.
#[derive(Debug)]
pub struct CompiledPatternRule {
    pub rule: PatternRule,
    pub kind: EntityKind,
    pub regex: Regex,
}

/// A compiled edge rule.
#[derive(Debug)]
pub struct CompiledEdgeRule {
    pub rule: EdgePatternRule,
    pub kind: RelationKind,
    pub regex: Regex,
}

impl CompiledSchema {
    /// Compile a document, validating every regex and kind name.
    ///
    /// A rule with an invalid regex fails the whole document: schemas are
    /// trusted configuration, and a silently skipped rule would corrupt
    /// coverage accounting.
    pub fn compile(document: SchemaDocument) -> Result<Self, SchemaError> {
        let mut glob_builder = globset::GlobSetBuilder::new();
        for pattern in &document.detection.path_globs {
            let glob = globset::Glob::new(pattern).map_err(|source| SchemaError::InvalidGlob {
                schema: document.name.clone(),
                pattern: pattern.clone(),
                source,
            })?;
            glob_builder.add(glob);
        }
        let path_globs = glob_builder
            .build()
            .map_err(|source| SchemaError::InvalidGlob {
                schema: document.name.clone(),
                pattern: "path_globs".to_string(),
                source,
            })?;

        let compile_all = |patterns: &[String]| -> Result<Vec<Regex>, SchemaError> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|source| SchemaError::InvalidRegex {
                        schema: document.name.clone(),
                        pattern: p.clone(),
                        source,
                    })
                })
                .collect()
        };

        let import_signatures = compile_all(&document.detection.import_signatures)?;
        let content_patterns = compile_all(&document.detection.content_patterns)?;

        let mut node_rules = Vec::with_capacity(document.node_patterns.len());
        for rule in &document.node_patterns {
            let kind = EntityKind::parse(&rule.kind).ok_or_else(|| SchemaError::UnknownKind {
                schema: document.name.clone(),
                pattern: rule.name.clone(),
                kind: rule.kind.clone(),
            })?;
            let regex = Regex::new(&rule.regex).map_err(|source| SchemaError::InvalidRegex {
                schema: document.name.clone(),
                pattern: rule.name.clone(),
                source,
            })?;
            node_rules.push(CompiledPatternRule {
                rule: rule.clone(),
                kind,
                regex,
            });
        }

        let mut edge_rules = Vec::with_capacity(document.edge_patterns.len());
        for rule in &document.edge_patterns {
            let kind = RelationKind::parse(&rule.kind).ok_or_else(|| SchemaError::UnknownKind {
                schema: document.name.clone(),
                pattern: rule.name.clone(),
                kind: rule.kind.clone(),
            })?;
            let regex = Regex::new(&rule.regex).map_err(|source| SchemaError::InvalidRegex {
                schema: document.name.clone(),
                pattern: rule.name.clone(),
                source,
            })?;
            edge_rules.push(CompiledEdgeRule {
                rule: rule.clone(),
                kind,
                regex,
            });
        }

        Ok(Self {
            document,
            path_globs,
            import_signatures,
            content_patterns,
            node_rules,
            edge_rules,
        })
    }

    /// Evaluate the detection predicate against a file.
    pub fn matches(&self, path: &str, content: &str) -> bool {
        if !self.path_globs.is_empty() && self.path_globs.is_match(path) {
            return true;
        }

        if !self.import_signatures.is_empty() {
            let import_section: String = content.lines().take(50).collect::<Vec<_>>().join("\n");
            if self
                .import_signatures
                .iter()
                .any(|re| re.is_match(&import_section))
            {
                return true;
            }
        }

        self.content_patterns.iter().any(|re| re.is_match(content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_doc(name: &str) -> SchemaDocument {
        SchemaDocument {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            language: "rust".to_string(),
            framework: None,
            description: None,
            detection: Detection {
                path_globs: vec!["**/*.rs".to_string()],
                import_signatures: vec![],
                content_patterns: vec![],
            },
            node_patterns: vec![PatternRule {
                name: "fn_def".to_string(),
                regex: r"(?m)^\s*(?:pub\s+)?(?:async\s+)?fn\s+(\w+)".to_string(),
                kind: "function".to_string(),
                name_group: 1,
                confidence_boost: 0.9,
                property_groups: Default::default(),
            }],
            edge_patterns: vec![],
        }
    }

    #[test]
    fn test_compile_and_match_by_glob() {
        let schema = CompiledSchema::compile(minimal_doc("base-rust")).unwrap();
        assert!(schema.matches("src/lib.rs", "fn main() {}"));
        assert!(!schema.matches("src/app.py", "def main(): pass"));
    }

    #[test]
    fn test_invalid_regex_fails_load() {
        let mut doc = minimal_doc("broken");
        doc.node_patterns[0].regex = "(unclosed".to_string();
        let err = CompiledSchema::compile(doc).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRegex { .. }));
    }

    #[test]
    fn test_unknown_kind_fails_load() {
        let mut doc = minimal_doc("unknown-kind");
        doc.node_patterns[0].kind = "gizmo".to_string();
        let err = CompiledSchema::compile(doc).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownKind { .. }));
    }

    #[test]
    fn test_import_signature_detection() {
        let mut doc = minimal_doc("actix");
        doc.detection.path_globs.clear();
        doc.detection.import_signatures = vec![r"^use actix_web".to_string()];
        let schema = CompiledSchema::compile(doc).unwrap();

        assert!(schema.matches("src/main.rs", "use actix_web::App;\nfn main() {}"));
        assert!(!schema.matches("src/main.rs", "use std::fs;\nfn main() {}"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let doc = minimal_doc("base-rust");
        let yaml = serde_yaml::to_string(&doc).unwrap();
        let parsed = SchemaDocument::from_yaml("inline", &yaml).unwrap();
        assert_eq!(parsed.name, doc.name);
        assert_eq!(parsed.node_patterns.len(), 1);
    }
}
