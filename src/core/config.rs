//! Configuration loaded from `bookworm.yaml`
//!
//! Every field has a default, so a missing file or a partial file both work.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "bookworm.yaml";

/// Largest chunk the packer builds, in characters
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 384;

/// Conversation memory ceiling, sized for a 128k-token context window
pub const DEFAULT_TOKEN_CEILING: usize = 131_072;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database: PathBuf,
    pub embedding: EndpointConfig,
    pub generation: EndpointConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub memory: MemoryConfig,
    pub store: StoreConfig,
    pub delivery: DeliveryConfig,
}

/// An external HTTP collaborator (embedding or generation endpoint)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    pub url: String,
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// OpenAI-style model listing (`GET` answering `{data: [{id}]}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_url: Option<String>,
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub top_n: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { top_n: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryConfig {
    pub token_ceiling: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            token_ceiling: DEFAULT_TOKEN_CEILING,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Compact after a removal once free pages exceed this fraction of the file
    pub vacuum_threshold: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            vacuum_threshold: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeliveryConfig {
    pub max_message_chars: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 1999,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("bookworm.db"),
            embedding: EndpointConfig {
                url: "http://localhost:11434/api/embeddings".to_string(),
                model: "nomic-embed-text".to_string(),
                timeout_secs: 60,
                models_url: None,
            },
            generation: EndpointConfig {
                url: "http://localhost:11434/api/generate".to_string(),
                model: "llama3.1".to_string(),
                timeout_secs: 300,
                models_url: Some("http://localhost:11434/v1/models".to_string()),
            },
            chunking: ChunkingConfig::default(),
            search: SearchConfig::default(),
            memory: MemoryConfig::default(),
            store: StoreConfig::default(),
            delivery: DeliveryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration
    ///
    /// An explicit path must exist. Without one, `bookworm.yaml` in the
    /// working directory is used if present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    tracing::debug!("no {} found, using defaults", CONFIG_FILE);
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document deserializes to null, not to an empty mapping
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chunk_chars == 0 {
            return Err(Error::Config("chunking.max_chunk_chars must be > 0".into()));
        }
        if self.search.top_n == 0 {
            return Err(Error::Config("search.top_n must be > 0".into()));
        }
        if self.delivery.max_message_chars == 0 {
            return Err(Error::Config("delivery.max_message_chars must be > 0".into()));
        }
        let t = self.store.vacuum_threshold;
        if !(t > 0.0 && t <= 1.0) {
            return Err(Error::Config(format!(
                "store.vacuum_threshold must be in (0, 1], got {}",
                t
            )));
        }
        for (name, endpoint) in [("embedding", &self.embedding), ("generation", &self.generation)] {
            if endpoint.url.is_empty() || endpoint.model.is_empty() {
                return Err(Error::Config(format!("{}.url and {}.model are required", name, name)));
            }
            if endpoint.timeout_secs == 0 {
                return Err(Error::Config(format!("{}.timeout_secs must be > 0", name)));
            }
        }
        Ok(())
    }
}
