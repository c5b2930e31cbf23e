//! Configuration management for CodeMesh.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Environment variables (highest priority)
//! 2. Project-local `codemesh.toml` file
//! 3. User config `~/.config/codemesh/config.toml`
//! 4. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod defaults;

pub use defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extraction pipeline configuration.
    pub extraction: ExtractionConfig,

    /// Trust ledger configuration.
    pub trust: TrustConfig,

    /// LLM provider configuration (escalation capability).
    pub llm: LlmConfig,

    /// Storage configuration.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./codemesh.toml` (project local)
    /// 2. `~/.config/codemesh/config.toml` (user config)
    /// 3. Falls back to defaults
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new("codemesh.toml").exists() {
            return Self::from_file("codemesh.toml");
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("codemesh").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        // LLM overrides
        if let Ok(provider) = std::env::var("CODEMESH_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("CODEMESH_LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Ok(url) = std::env::var("CODEMESH_LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Ok(key) = std::env::var("CODEMESH_LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }

        // Extraction overrides
        if let Ok(width) = std::env::var("CODEMESH_WORKERS") {
            if let Ok(n) = width.parse() {
                self.extraction.worker_pool_width = n;
            }
        }
        if let Ok(enable) = std::env::var("CODEMESH_ENABLE_AI") {
            self.extraction.enable_escalation = enable == "1" || enable.eq_ignore_ascii_case("true");
        }

        // Storage overrides
        if let Ok(dir) = std::env::var("CODEMESH_DATA_DIR") {
            self.storage.data_dir = dir;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.extraction;
        for (name, value) in [
            ("tier1_confidence_threshold", t.tier1_confidence_threshold),
            ("tier2_confidence_threshold", t.tier2_confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if t.worker_pool_width == 0 {
            return Err(ConfigError::Invalid(
                "worker_pool_width must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Extraction pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Maximum size of a single source file to extract (in bytes).
    pub max_file_size: u64,

    /// Width of the bounded worker pool.
    pub worker_pool_width: usize,

    /// Whether Tier-2/3 escalation is enabled (requires an LLM provider).
    pub enable_escalation: bool,

    /// Tier-1 acceptance floor; matched candidates below this are ambiguous.
    pub tier1_confidence_threshold: f64,

    /// Tier-2 cutoff; disambiguation below this escalates to Tier-3.
    pub tier2_confidence_threshold: f64,

    /// Rename similarity at or above which a rename is a structural move.
    pub rename_similarity: u32,

    /// File extensions to extract (without leading dot).
    pub include_extensions: Vec<String>,

    /// Directories to exclude from walking.
    pub exclude_dirs: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            worker_pool_width: DEFAULT_WORKER_POOL_WIDTH,
            enable_escalation: true,
            tier1_confidence_threshold: DEFAULT_TIER1_CONFIDENCE_THRESHOLD,
            tier2_confidence_threshold: DEFAULT_TIER2_CONFIDENCE_THRESHOLD,
            rename_similarity: DEFAULT_RENAME_SIMILARITY,
            include_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Trust ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Minimum evidence for one (language, pattern) before a proposal.
    pub min_evolution_evidence: usize,

    /// Correction rate above which a schema needs evolution.
    pub evolution_correction_rate: f64,

    /// Rejection rate above which a schema needs evolution.
    pub evolution_rejection_rate: f64,

    /// Minimum samples before evolution flags are meaningful.
    pub min_samples_for_evolution: u64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            min_evolution_evidence: DEFAULT_MIN_EVOLUTION_EVIDENCE,
            evolution_correction_rate: DEFAULT_EVOLUTION_CORRECTION_RATE,
            evolution_rejection_rate: DEFAULT_EVOLUTION_REJECTION_RATE,
            min_samples_for_evolution: DEFAULT_MIN_SAMPLES_FOR_EVOLUTION,
        }
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai", "anthropic", "ollama", or "openai-compatible".
    pub provider: String,

    /// Model name (provider-specific).
    pub model: Option<String>,

    /// Base URL for API (for openai-compatible providers).
    pub base_url: Option<String>,

    /// API key (can also be set via environment variable).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Maximum tokens for response.
    pub max_tokens: u32,

    /// API version (for Anthropic).
    pub api_version: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_LLM_PROVIDER.to_string(),
            model: None,
            base_url: None,
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: Some(DEFAULT_ANTHROPIC_API_VERSION.to_string()),
        }
    }
}

impl LlmConfig {
    /// Get the model name, falling back to provider defaults.
    pub fn model_or_default(&self) -> String {
        self.model.clone().unwrap_or_else(|| match self.provider.as_str() {
            "anthropic" | "claude" => DEFAULT_ANTHROPIC_MODEL.to_string(),
            "ollama" => DEFAULT_OLLAMA_MODEL.to_string(),
            _ => DEFAULT_OPENAI_MODEL.to_string(),
        })
    }

    /// Get API key from config or environment.
    pub fn api_key_or_env(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("CODEMESH_LLM_API_KEY").ok())
            .or_else(|| match self.provider.as_str() {
                "anthropic" | "claude" => std::env::var("ANTHROPIC_API_KEY").ok(),
                _ => std::env::var("OPENAI_API_KEY").ok(),
            })
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for codemesh data (default: ".codemesh").
    pub data_dir: String,

    /// Mesh database subdirectory name.
    pub mesh_db_dir: String,

    /// Schema documents subdirectory name.
    pub schema_dir: String,

    /// Trust snapshot file name.
    pub trust_store_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: DEFAULT_DATA_DIR.to_string(),
            mesh_db_dir: DEFAULT_MESH_DB_DIR.to_string(),
            schema_dir: DEFAULT_SCHEMA_DIR.to_string(),
            trust_store_file: DEFAULT_TRUST_STORE_FILE.to_string(),
        }
    }
}

impl StorageConfig {
    /// Full path to the mesh database directory.
    pub fn mesh_db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.mesh_db_dir)
    }

    /// Full path to the schema documents directory.
    pub fn schema_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.schema_dir)
    }

    /// Full path to the trust snapshot file.
    pub fn trust_store_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.trust_store_file)
    }

    /// Directory for cloned repositories (under the user home).
    pub fn repos_path(&self) -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_DATA_DIR)
            .join(DEFAULT_REPOS_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.extraction.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(config.llm.provider, DEFAULT_LLM_PROVIDER);
        assert_eq!(config.storage.data_dir, DEFAULT_DATA_DIR);
        assert_eq!(
            config.extraction.tier2_confidence_threshold,
            DEFAULT_TIER2_CONFIDENCE_THRESHOLD
        );
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[extraction]"));
        assert!(toml_str.contains("[trust]"));
        assert!(toml_str.contains("[llm]"));
        assert!(toml_str.contains("[storage]"));
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[extraction]
worker_pool_width = 4
enable_escalation = false

[llm]
provider = "ollama"
model = "llama3"

[storage]
data_dir = ".custom-mesh"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.extraction.worker_pool_width, 4);
        assert!(!config.extraction.enable_escalation);
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.storage.data_dir, ".custom-mesh");
    }

    #[test]
    fn test_model_or_default() {
        let mut config = LlmConfig::default();

        config.provider = "anthropic".to_string();
        assert_eq!(config.model_or_default(), DEFAULT_ANTHROPIC_MODEL);

        config.provider = "ollama".to_string();
        assert_eq!(config.model_or_default(), DEFAULT_OLLAMA_MODEL);

        config.model = Some("custom-model".to_string());
        assert_eq!(config.model_or_default(), "custom-model");
    }
}
