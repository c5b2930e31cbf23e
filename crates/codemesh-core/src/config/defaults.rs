//! Default values for CodeMesh configuration.
//!
//! All hardcoded defaults are centralized here for easy maintenance.

// ============================================================================
// Extraction Defaults
// ============================================================================

/// Maximum size of a single source file to extract (1 MB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Width of the bounded worker pool that processes files concurrently.
/// A resource budget, not a correctness constraint.
pub const DEFAULT_WORKER_POOL_WIDTH: usize = 8;

/// Minimum Tier-1 confidence below which a matched candidate is still
/// considered ambiguous and eligible for escalation.
pub const DEFAULT_TIER1_CONFIDENCE_THRESHOLD: f64 = 0.4;

/// Tier-2 confidence cutoff: a disambiguation result below this escalates
/// further to Tier-3 discovery.
pub const DEFAULT_TIER2_CONFIDENCE_THRESHOLD: f64 = 0.6;

/// Rename similarity (git's percentage score) at or above which a renamed
/// file is treated as a structural move instead of delete+add.
pub const DEFAULT_RENAME_SIMILARITY: u32 = 80;

/// Default source file extensions to extract.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    // Systems
    "rs", "c", "cpp", "h", "hpp", "go", // JVM
    "java", "kt", "scala", // .NET
    "cs", "fs", // Scripting
    "py", "rb", "php", // JavaScript
    "js", "ts", "tsx", "jsx", "vue", "svelte", // Mobile
    "swift", // Database
    "sql",
];

/// Default directories to exclude from extraction.
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    // Version control
    ".git",
    ".svn",
    ".hg",
    // Dependencies
    "node_modules",
    "vendor",
    "venv",
    ".venv",
    "__pycache__",
    // Build outputs
    "target",
    "build",
    "dist",
    "out",
    "bin",
    "obj",
    // CodeMesh's own data
    ".codemesh",
];

// ============================================================================
// Trust Defaults
// ============================================================================

/// Trusted tier: accuracy floor.
pub const TRUSTED_MIN_ACCURACY: f64 = 0.95;
/// Trusted tier: correction-rate ceiling.
pub const TRUSTED_MAX_CORRECTION_RATE: f64 = 0.05;
/// Trusted tier: minimum sample count.
pub const TRUSTED_MIN_SAMPLES: u64 = 100;
/// Trusted tier: verification sampling rate.
pub const TRUSTED_SAMPLING_RATE: f64 = 0.05;

/// High tier: accuracy floor.
pub const HIGH_MIN_ACCURACY: f64 = 0.90;
/// High tier: correction-rate ceiling.
pub const HIGH_MAX_CORRECTION_RATE: f64 = 0.10;
/// High tier: minimum sample count.
pub const HIGH_MIN_SAMPLES: u64 = 50;
/// High tier: verification sampling rate.
pub const HIGH_SAMPLING_RATE: f64 = 0.20;

/// Medium tier: accuracy floor.
pub const MEDIUM_MIN_ACCURACY: f64 = 0.80;
/// Medium tier: minimum sample count.
pub const MEDIUM_MIN_SAMPLES: u64 = 20;
/// Medium tier: verification sampling rate.
pub const MEDIUM_SAMPLING_RATE: f64 = 0.50;

/// Low tier (bootstrap): verification sampling rate.
pub const LOW_SAMPLING_RATE: f64 = 1.0;

/// Format version written into trust-store snapshots.
pub const TRUST_STORE_FORMAT_VERSION: u32 = 1;

/// Default trust snapshot file name (under the data directory).
pub const DEFAULT_TRUST_STORE_FILE: &str = "trust.json";

// ============================================================================
// Evolution Defaults
// ============================================================================

/// Minimum pieces of evidence for one (language, pattern) before the
/// evolution queue emits a schema proposal.
pub const DEFAULT_MIN_EVOLUTION_EVIDENCE: usize = 5;

/// Correction rate above which a schema is flagged as needing evolution.
pub const DEFAULT_EVOLUTION_CORRECTION_RATE: f64 = 0.10;

/// Rejection rate above which a schema is flagged as needing evolution.
pub const DEFAULT_EVOLUTION_REJECTION_RATE: f64 = 0.05;

/// Minimum samples before evolution flags are meaningful.
pub const DEFAULT_MIN_SAMPLES_FOR_EVOLUTION: u64 = 20;

// ============================================================================
// LLM Defaults
// ============================================================================

/// Default LLM provider.
pub const DEFAULT_LLM_PROVIDER: &str = "openai";

/// Default max tokens for LLM responses.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// OpenAI defaults
/// Default OpenAI API URL.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
/// Default OpenAI model.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";

// Anthropic defaults
/// Default Anthropic API URL.
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
/// Default Anthropic model.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";
/// Default Anthropic API version.
pub const DEFAULT_ANTHROPIC_API_VERSION: &str = "2023-06-01";

// Ollama defaults
/// Default Ollama API URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/v1";
/// Default Ollama model.
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

// ============================================================================
// Storage Defaults
// ============================================================================

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = ".codemesh";

/// Default mesh database subdirectory (SurrealDB/RocksDB files).
pub const DEFAULT_MESH_DB_DIR: &str = "mesh.db";

/// Default schema documents subdirectory.
pub const DEFAULT_SCHEMA_DIR: &str = "schemas";

/// Default directory for cloned repositories (under the user home).
pub const DEFAULT_REPOS_DIR: &str = "repos";
