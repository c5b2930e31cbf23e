use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use codemesh_core::config::Config;
use codemesh_core::evolution::{schema_health, EvolutionQueue};
use codemesh_core::llm::Provider;
use codemesh_core::revision::RepoSync;
use codemesh_core::router::{Escalation, LlmEscalation};
use codemesh_core::trust::TrustStore;
use codemesh_core::{
    ExtractionEngine, ExtractionRouter, MeshDb, RouterOptions, RunRequest, SchemaRegistry,
    TrustLedger,
};

#[derive(Parser)]
#[command(name = "codemesh")]
#[command(about = "Code knowledge mesh with git-anchored, trust-sampled extraction", long_about = None)]
struct Cli {
    /// Path to a config file (default: codemesh.toml, then user config)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default codemesh.toml in the current directory
    Init,
    /// Extract a project into the mesh
    Extract {
        /// Path to the project repository
        path: PathBuf,
        /// Project identifier (defaults to the directory name)
        #[arg(long)]
        project_id: Option<String>,
        /// Force a full extraction, ignoring incremental state
        #[arg(long)]
        full: bool,
        /// Disable AI escalation even when configured
        #[arg(long)]
        no_ai: bool,
    },
    /// Clone or pull a remote repository, then extract it
    Sync {
        /// Remote repository URL
        url: String,
        /// Branch to sync
        #[arg(long, default_value = "main")]
        branch: String,
        /// Project identifier (defaults to the repository name)
        #[arg(long)]
        project_id: Option<String>,
    },
    /// Show the extraction run history for a project branch
    History {
        project_id: String,
        #[arg(long, default_value = "main")]
        branch: String,
    },
    /// Show trust ledger records
    Trust {
        /// Only show patterns needing schema evolution
        #[arg(long)]
        unhealthy: bool,
    },
    /// Show mesh statistics for a project
    Stats { project_id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Init => init(),
        Commands::Extract {
            ref path,
            ref project_id,
            full,
            no_ai,
        } => extract(&config, path, project_id.as_deref(), full, no_ai).await,
        Commands::Sync {
            ref url,
            ref branch,
            ref project_id,
        } => sync(&config, url, branch, project_id.as_deref()).await,
        Commands::History {
            ref project_id,
            ref branch,
        } => history(&config, project_id, branch).await,
        Commands::Trust { unhealthy } => trust(&config, unhealthy),
        Commands::Stats { ref project_id } => stats(&config, project_id).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    match &cli.config {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::load()?),
    }
}

fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = PathBuf::from("codemesh.toml");
    if path.exists() {
        return Err("codemesh.toml already exists".into());
    }
    std::fs::write(&path, Config::default_config_string())?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn open_db(config: &Config) -> Result<Arc<MeshDb>, Box<dyn std::error::Error>> {
    let db = MeshDb::open(&config.storage.mesh_db_path()).await?;
    db.initialize_schema().await?;
    Ok(Arc::new(db))
}

/// Assemble the extraction stack from configuration.
async fn build_engine(
    config: &Config,
    no_ai: bool,
) -> Result<(ExtractionEngine, Arc<EvolutionQueue>), Box<dyn std::error::Error>> {
    let registry = Arc::new(SchemaRegistry::load_dir(config.storage.schema_path())?);
    let ledger = Arc::new(TrustLedger::open(TrustStore::new(
        config.storage.trust_store_path(),
    )));
    let evolution = Arc::new(EvolutionQueue::new());

    let escalation: Option<Arc<dyn Escalation>> =
        if config.extraction.enable_escalation && !no_ai {
            match Provider::from_config(&config.llm).build() {
                Ok(llm) => Some(Arc::new(LlmEscalation::new(llm))),
                Err(e) => {
                    eprintln!("warning: escalation disabled ({e})");
                    None
                }
            }
        } else {
            None
        };

    let router = Arc::new(ExtractionRouter::new(
        Arc::clone(&registry),
        Arc::clone(&ledger),
        Arc::clone(&evolution),
        escalation,
        RouterOptions {
            tier1_confidence_threshold: config.extraction.tier1_confidence_threshold,
            tier2_confidence_threshold: config.extraction.tier2_confidence_threshold,
        },
    ));

    let db = open_db(config).await?;
    let engine = ExtractionEngine::new(db, router, ledger, config.extraction.clone());
    Ok((engine, evolution))
}

async fn extract(
    config: &Config,
    path: &Path,
    project_id: Option<&str>,
    full: bool,
    no_ai: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let project_id = project_id
        .map(str::to_string)
        .or_else(|| {
            path.canonicalize()
                .ok()?
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
        })
        .ok_or("could not derive a project id; pass --project-id")?;

    let (engine, evolution) = build_engine(config, no_ai).await?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("extracting {project_id}"));
    spinner.enable_steady_tick(std::time::Duration::from_millis(120));

    let request = RunRequest {
        project_id,
        repo_path: path.to_path_buf(),
        full,
    };
    let summary = engine.run(&request).await?;
    spinner.finish_and_clear();

    println!(
        "Extracted {} at {} ({})",
        summary.project_id,
        &summary.commit_sha[..7.min(summary.commit_sha.len())],
        summary.branch
    );
    println!(
        "  files: {}  nodes: {}  edges: {}",
        summary.files_extracted, summary.total_nodes, summary.total_edges
    );
    if summary.unresolved_patterns > 0 || summary.errors > 0 || summary.dangling_edges > 0 {
        println!(
            "  unresolved: {}  errors: {}  dangling edges: {}",
            summary.unresolved_patterns, summary.errors, summary.dangling_edges
        );
    }
    if !summary.complete {
        println!("  (run incomplete: cancelled before all files were processed)");
    }

    let proposals = evolution.proposals(config.trust.min_evolution_evidence);
    if !proposals.is_empty() {
        println!("  schema proposals ready: {}", proposals.len());
        for proposal in proposals {
            println!(
                "    {} / {} ({} pieces of evidence)",
                proposal.language,
                proposal.pattern,
                proposal.evidence.len()
            );
        }
    }

    Ok(())
}

async fn sync(
    config: &Config,
    url: &str,
    branch: &str,
    project_id: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let repo_sync = RepoSync::new(config.storage.repos_path());
    let result = repo_sync.sync(url, branch).await?;
    let path = repo_sync.repo_path(url);

    println!(
        "Synced {url} ({:?}) at {}",
        result.action,
        &result.commit[..7.min(result.commit.len())]
    );

    let derived = path.file_name().map(|n| n.to_string_lossy().to_string());
    extract(config, &path, project_id.or(derived.as_deref()), false, false).await
}

async fn history(
    config: &Config,
    project_id: &str,
    branch: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(config).await?;
    let runs = db.run_history(project_id, branch).await?;

    if runs.is_empty() {
        println!("No extraction runs recorded for {project_id} on {branch}.");
        return Ok(());
    }

    for run in runs {
        println!(
            "{}  {}  files: {:>4}  nodes: {:>5}  edges: {:>5}{}",
            run.run_at.format("%Y-%m-%d %H:%M:%S"),
            &run.commit_sha[..7.min(run.commit_sha.len())],
            run.files_extracted,
            run.total_nodes,
            run.total_edges,
            if run.complete { "" } else { "  [incomplete]" }
        );
    }
    Ok(())
}

fn trust(config: &Config, unhealthy: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = TrustLedger::open(TrustStore::new(config.storage.trust_store_path()));
    let reports = schema_health(&ledger, &config.trust);

    if reports.is_empty() {
        println!("Trust ledger is empty.");
        return Ok(());
    }

    println!(
        "{:<20} {:<24} {:<10} {:>8} {:>9} {:>8} {:>7}",
        "schema", "pattern", "language", "level", "accuracy", "correct", "total"
    );
    for report in reports {
        if unhealthy && !report.needs_evolution {
            continue;
        }
        println!(
            "{:<20} {:<24} {:<10} {:>8} {:>8.1}% {:>7.1}% {:>7}{}",
            report.schema_id,
            report.pattern,
            report.language,
            report.trust_level.to_string(),
            report.accuracy * 100.0,
            report.correction_rate * 100.0,
            report.total_extractions,
            if report.needs_evolution { "  *" } else { "" }
        );
    }
    Ok(())
}

async fn stats(config: &Config, project_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = open_db(config).await?;
    let stats = db.stats(project_id).await?;
    println!("Project {project_id}:");
    println!("  entities:  {}", stats.entities);
    println!("  relations: {}", stats.relations);
    println!("  runs:      {}", stats.runs);
    Ok(())
}
