//! End-to-end engine tests over real git repositories and a real store.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;

use codemesh_core::config::ExtractionConfig;
use codemesh_core::evolution::EvolutionQueue;
use codemesh_core::schema::{Detection, PatternRule, SchemaDocument};
use codemesh_core::trust::TrustLedger;
use codemesh_core::{
    ExtractionEngine, ExtractionRouter, MeshDb, RouterOptions, RunRequest, SchemaRegistry,
};

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git spawns");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

fn init_repo(dir: &Path) {
    git(dir, &["init", "-b", "main"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "user.name", "Test"]);
}

fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-m", message]);
}

fn rust_schema() -> SchemaDocument {
    SchemaDocument {
        name: "base-rust".to_string(),
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
            regex: r"(?m)^\s*(?:pub\s+)?fn\s+(\w+)".to_string(),
            kind: "function".to_string(),
            name_group: 1,
            confidence_boost: 0.9,
            property_groups: Default::default(),
        }],
        edge_patterns: vec![],
    }
}

async fn engine_at(db_dir: &Path) -> (ExtractionEngine, Arc<MeshDb>) {
    let db = Arc::new(MeshDb::open(&db_dir.join("mesh.db")).await.unwrap());
    db.initialize_schema().await.unwrap();

    let registry = Arc::new(SchemaRegistry::new());
    registry.insert(rust_schema()).unwrap();
    let ledger = Arc::new(TrustLedger::in_memory());
    let evolution = Arc::new(EvolutionQueue::new());

    let router = Arc::new(ExtractionRouter::new(
        registry,
        Arc::clone(&ledger),
        evolution,
        None,
        RouterOptions::default(),
    ));

    let engine = ExtractionEngine::new(
        Arc::clone(&db),
        router,
        ledger,
        ExtractionConfig::default(),
    );
    (engine, db)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_run_then_unchanged_incremental() {
    let repo = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    init_repo(repo.path());
    std::fs::write(repo.path().join("lib.rs"), "pub fn alpha() {}\n").unwrap();
    std::fs::write(repo.path().join("util.rs"), "fn beta() {}\n").unwrap();
    commit_all(repo.path(), "initial");

    let (engine, db) = engine_at(data.path()).await;
    let request = RunRequest {
        project_id: "demo".to_string(),
        repo_path: repo.path().to_path_buf(),
        full: false,
    };

    let first = engine.run(&request).await.unwrap();
    assert_eq!(first.files_extracted, 2);
    assert!(first.total_nodes >= 4); // 2 files + 2 functions
    assert!(first.complete);
    assert!(first.run_id.is_some());

    // Unchanged file set: zero new work, but a new chained run record with
    // files_extracted = 0.
    let second = engine.run(&request).await.unwrap();
    assert_eq!(second.files_extracted, 0);
    assert!(second.run_id.is_some());

    let history = db.run_history("demo", &first.branch).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, first.run_id.clone().unwrap());
    assert_eq!(history[1].id, second.run_id.clone().unwrap());
    assert_eq!(history[1].files_extracted, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sequential_commits_chain_runs() {
    let repo = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    init_repo(repo.path());
    std::fs::write(repo.path().join("a.rs"), "fn one() {}\n").unwrap();
    std::fs::write(repo.path().join("b.rs"), "fn two() {}\n").unwrap();
    commit_all(repo.path(), "c1");

    let (engine, db) = engine_at(data.path()).await;
    let request = RunRequest {
        project_id: "demo".to_string(),
        repo_path: repo.path().to_path_buf(),
        full: false,
    };

    let first = engine.run(&request).await.unwrap();
    assert_eq!(first.files_extracted, 2);

    // Change one file only; the incremental run must touch exactly it.
    std::fs::write(repo.path().join("a.rs"), "fn one() {}\nfn extra() {}\n").unwrap();
    commit_all(repo.path(), "c2");

    let second = engine.run(&request).await.unwrap();
    assert_eq!(second.files_extracted, 1);
    assert_ne!(first.commit_sha, second.commit_sha);

    // Two runs linked by exactly one "next" edge, c1 -> c2.
    let history = db.run_history("demo", &second.branch).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].commit_sha, first.commit_sha);
    assert_eq!(history[1].commit_sha, second.commit_sha);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rename_preserves_entity_identity() {
    let repo = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    init_repo(repo.path());
    std::fs::write(
        repo.path().join("old_name.rs"),
        "pub fn stable_api() {}\npub fn another() {}\n",
    )
    .unwrap();
    commit_all(repo.path(), "c1");

    let (engine, db) = engine_at(data.path()).await;
    let request = RunRequest {
        project_id: "demo".to_string(),
        repo_path: repo.path().to_path_buf(),
        full: false,
    };
    engine.run(&request).await.unwrap();

    let mut before = db.file_entity_ids("demo", "old_name.rs").await.unwrap();
    assert!(!before.is_empty());

    // Pure rename: content identical, similarity 100.
    git(repo.path(), &["mv", "old_name.rs", "new_name.rs"]);
    commit_all(repo.path(), "c2");
    let summary = engine.run(&request).await.unwrap();

    // A structural move, not a delete+create: no re-extraction happened and
    // the entity ids survived under the new path.
    assert_eq!(summary.files_extracted, 0);
    let mut after = db.file_entity_ids("demo", "new_name.rs").await.unwrap();
    before.sort();
    after.sort();
    assert_eq!(before, after);

    let orphans = db.file_entity_ids("demo", "old_name.rs").await.unwrap();
    assert!(orphans.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_deleted_file_entities_removed() {
    let repo = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    init_repo(repo.path());
    std::fs::write(repo.path().join("gone.rs"), "fn doomed() {}\n").unwrap();
    std::fs::write(repo.path().join("kept.rs"), "fn kept() {}\n").unwrap();
    commit_all(repo.path(), "c1");

    let (engine, db) = engine_at(data.path()).await;
    let request = RunRequest {
        project_id: "demo".to_string(),
        repo_path: repo.path().to_path_buf(),
        full: false,
    };
    engine.run(&request).await.unwrap();

    git(repo.path(), &["rm", "gone.rs"]);
    commit_all(repo.path(), "c2");
    engine.run(&request).await.unwrap();

    assert!(db.file_entity_ids("demo", "gone.rs").await.unwrap().is_empty());
    assert!(!db.file_entity_ids("demo", "kept.rs").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_every_submitted_file_has_a_result() {
    let repo = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    init_repo(repo.path());
    // One file no schema matches: still must appear in the results.
    std::fs::write(repo.path().join("covered.rs"), "fn f() {}\n").unwrap();
    std::fs::write(repo.path().join("orphan.py"), "def g(): pass\n").unwrap();
    commit_all(repo.path(), "c1");

    let (engine, _db) = engine_at(data.path()).await;
    let summary = engine
        .run(&RunRequest {
            project_id: "demo".to_string(),
            repo_path: repo.path().to_path_buf(),
            full: false,
        })
        .await
        .unwrap();

    assert_eq!(summary.files_extracted, 2);
    let paths: Vec<&str> = summary.results.iter().map(|r| r.file_path.as_str()).collect();
    assert!(paths.contains(&"covered.rs"));
    assert!(paths.contains(&"orphan.py"));

    let orphan = summary
        .results
        .iter()
        .find(|r| r.file_path == "orphan.py")
        .unwrap();
    assert_eq!(orphan.confidence, 0.0);
    assert_eq!(orphan.nodes.len(), 1);
    assert!(!orphan.unresolved_patterns.is_empty());
}
