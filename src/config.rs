//! SafeClaw Memory configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default working memory capacity
pub const WORKING_MAX_SIZE: usize = 20;

/// Default importance threshold for automatic episodic promotion
pub const DEFAULT_PROMOTION_THRESHOLD: f32 = 0.5;

/// Main memory store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Working memory configuration
    #[serde(default)]
    pub working: WorkingConfig,

    /// Episodic memory configuration
    #[serde(default)]
    pub episodic: EpisodicConfig,

    /// Consolidation configuration
    #[serde(default)]
    pub consolidation: ConsolidationConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

impl MemoryConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration rooted at a specific data directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                base_dir: base_dir.into(),
            },
            ..Self::default()
        }
    }

    /// Reject configurations the store cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.working.max_size == 0 {
            return Err(Error::Config(
                "working.max_size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.episodic.promotion_threshold) {
            return Err(Error::Config(format!(
                "episodic.promotion_threshold must be within [0, 1], got {}",
                self.episodic.promotion_threshold
            )));
        }
        if self.episodic.default_limit == 0 {
            return Err(Error::Config(
                "episodic.default_limit must be at least 1".to_string(),
            ));
        }
        if self.consolidation.min_occurrences < 2 {
            return Err(Error::Config(
                "consolidation.min_occurrences must be at least 2".to_string(),
            ));
        }
        if self.embedding.dimensions == 0 {
            return Err(Error::Config(
                "embedding.dimensions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Working memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkingConfig {
    /// Maximum number of interactions kept in the buffer
    pub max_size: usize,
}

impl Default for WorkingConfig {
    fn default() -> Self {
        Self {
            max_size: WORKING_MAX_SIZE,
        }
    }
}

/// Episodic memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodicConfig {
    /// Interactions scoring above this are promoted automatically
    pub promotion_threshold: f32,

    /// Result limit used when callers don't pass one
    pub default_limit: usize,
}

impl Default for EpisodicConfig {
    fn default() -> Self {
        Self {
            promotion_threshold: DEFAULT_PROMOTION_THRESHOLD,
            default_limit: 5,
        }
    }
}

/// Consolidation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Run the background consolidation worker
    pub enabled: bool,

    /// Seconds between background runs (0 = on demand only)
    pub interval_secs: u64,

    /// Occurrences needed before a pattern is promoted to core memory
    pub min_occurrences: usize,

    /// Fold duplicate episodic memories into their most recent copy
    pub dedupe: bool,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            min_occurrences: 2,
            dedupe: true,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for durable memory files
    pub base_dir: PathBuf,
}

impl StorageConfig {
    /// Append-only episodic log
    pub fn episodic_path(&self) -> PathBuf {
        self.base_dir.join("episodic.jsonl")
    }

    /// Core fact tree document
    pub fn core_path(&self) -> PathBuf {
        self.base_dir.join("core.json")
    }

    /// Exclusive lock file for the data directory
    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: dirs_next::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".safeclaw")
                .join("memory"),
        }
    }
}

/// Embedding configuration for the built-in lexicon embedder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Number of hashed token buckets appended to the concept dimensions
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimensions: 128 }
    }
}
