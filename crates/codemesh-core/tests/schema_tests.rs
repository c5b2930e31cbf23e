use codemesh_core::schema::{CompiledSchema, SchemaDocument, SchemaError};
use codemesh_core::SchemaRegistry;
use tempfile::TempDir;

const PYTHON_SCHEMA: &str = r#"
name: base-python
version: 1.0.0
language: python
description: Base Python extraction patterns
detection:
  path_globs:
    - "**/*.py"
node_patterns:
  - name: function_def
    regex: '(?m)^\s*(?:async\s+)?def\s+(\w+)'
    kind: function
    name_group: 1
    confidence_boost: 0.9
  - name: class_def
    regex: '(?m)^class\s+(\w+)(?:\(([\w.,\s]+)\))?'
    kind: class
    name_group: 1
    confidence_boost: 0.9
    property_groups:
      bases: 2
"#;

const FASTAPI_SCHEMA: &str = r#"
name: fastapi
version: 1.0.0
language: python
framework: fastapi
detection:
  import_signatures:
    - '(?m)^from fastapi import'
    - '(?m)^import fastapi'
node_patterns:
  - name: route_def
    regex: '(?m)^@\w+\.(?:get|post|put|delete|patch)\("([^"]+)"\)'
    kind: endpoint
    name_group: 1
    confidence_boost: 0.85
"#;

#[test]
fn test_documents_load_from_directory() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("base-python.yaml"), PYTHON_SCHEMA).unwrap();
    std::fs::write(tmp.path().join("fastapi.yml"), FASTAPI_SCHEMA).unwrap();
    // Non-YAML files are ignored.
    std::fs::write(tmp.path().join("notes.txt"), "not a schema").unwrap();

    let registry = SchemaRegistry::load_dir(tmp.path()).unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names(), vec!["base-python", "fastapi"]);
}

#[test]
fn test_detection_predicates_select_files() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("base-python.yaml"), PYTHON_SCHEMA).unwrap();
    std::fs::write(tmp.path().join("fastapi.yml"), FASTAPI_SCHEMA).unwrap();
    let registry = SchemaRegistry::load_dir(tmp.path()).unwrap();

    // Plain python file: only the glob-based base schema applies.
    let plain = registry.matching_schemas("app/util.py", "def helper(): pass\n");
    assert_eq!(plain.len(), 1);
    assert_eq!(plain[0].document.name, "base-python");

    // FastAPI file: both the base schema (glob) and the framework schema
    // (import signature) apply.
    let api = registry.matching_schemas(
        "app/main.py",
        "from fastapi import FastAPI\n\napp = FastAPI()\n",
    );
    assert_eq!(api.len(), 2);

    // Unrelated file: nothing applies.
    assert!(registry.matching_schemas("main.go", "package main\n").is_empty());
}

#[test]
fn test_property_groups_capture() {
    let document = SchemaDocument::from_yaml("inline", PYTHON_SCHEMA).unwrap();
    let schema = CompiledSchema::compile(document).unwrap();

    let class_rule = schema
        .node_rules
        .iter()
        .find(|r| r.rule.name == "class_def")
        .unwrap();
    let captures = class_rule
        .regex
        .captures("class Repository(Base, Generic):\n")
        .unwrap();
    assert_eq!(&captures[1], "Repository");
    assert_eq!(&captures[2], "Base, Generic");
    assert_eq!(class_rule.rule.property_groups.get("bases"), Some(&2));
}

#[test]
fn test_unparseable_document_fails_load() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("broken.yaml"), "name: [unclosed").unwrap();

    let err = SchemaRegistry::load_dir(tmp.path()).unwrap_err();
    assert!(matches!(err, SchemaError::Parse { .. }));
}

#[test]
fn test_versioned_document_round_trips() {
    let document = SchemaDocument::from_yaml("inline", FASTAPI_SCHEMA).unwrap();
    assert_eq!(document.version, "1.0.0");
    assert_eq!(document.framework.as_deref(), Some("fastapi"));

    let yaml = serde_yaml::to_string(&document).unwrap();
    let reparsed = SchemaDocument::from_yaml("inline", &yaml).unwrap();
    assert_eq!(reparsed.name, document.name);
    assert_eq!(reparsed.node_patterns.len(), document.node_patterns.len());
}
