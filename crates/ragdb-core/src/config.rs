//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_ENGINE__INDEX__KIND=graph`). Provides helpers to expand `~` and
//! `${VAR}` and to resolve relative paths against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::text::ChunkingConfig;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Self::defaults().merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.engine()?;
        Ok(config)
    }

    /// Defaults overlaid with an inline TOML document; no files or env vars.
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Self::defaults().merge(Toml::string(toml)) }
    }

    fn defaults() -> Figment {
        Figment::new().merge(Serialized::default("engine", EngineConfig::default()))
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The typed, validated `[engine]` section with `data_dir` expanded.
    pub fn engine(&self) -> anyhow::Result<EngineConfig> {
        let mut engine: EngineConfig = self.get("engine")?;
        engine.data_dir = expand_path(engine.data_dir.to_string_lossy());
        engine.validate()?;
        Ok(engine)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Flat,
    Clustered,
    Graph,
}

impl IndexKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Clustered => "clustered",
            Self::Graph => "graph",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "clustered" | "ivf" => Ok(Self::Clustered),
            "graph" | "hnsw" => Ok(Self::Graph),
            other => Err(Error::Config(format!("unknown index kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Euclidean,
    Cosine,
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Euclidean => "euclidean",
            Self::Cosine => "cosine",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    #[default]
    Distance,
    KeywordBlend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `hash` or `bge-m3`.
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub cache_capacity: usize,
    pub cache_flush_every: usize,
    pub model_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "hash".into(),
            dimension: 384,
            batch_size: 32,
            max_concurrency: 4,
            cache_capacity: 50_000,
            cache_flush_every: 64,
            model_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub kind: IndexKind,
    pub metric: Metric,
    /// Cluster count for the clustered backend; derived from corpus size when unset.
    pub nlist: Option<usize>,
    pub nprobe: usize,
    pub min_train_size: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub rebuild_tombstone_ratio: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            kind: IndexKind::Flat,
            metric: Metric::Euclidean,
            nlist: None,
            nprobe: 8,
            min_train_size: 100,
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            rebuild_tombstone_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_k: usize,
    pub max_context_chars: usize,
    pub scorer: ScorerKind,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { default_k: 5, max_context_chars: 4000, scorer: ScorerKind::Distance }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./ragdb_data"),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        let positive = [
            ("embedding.dimension", self.embedding.dimension),
            ("embedding.batch_size", self.embedding.batch_size),
            ("embedding.max_concurrency", self.embedding.max_concurrency),
            ("embedding.cache_capacity", self.embedding.cache_capacity),
            ("embedding.cache_flush_every", self.embedding.cache_flush_every),
            ("index.nprobe", self.index.nprobe),
            ("index.min_train_size", self.index.min_train_size),
            ("index.ef_construction", self.index.ef_construction),
            ("index.ef_search", self.index.ef_search),
            ("retrieval.default_k", self.retrieval.default_k),
            ("retrieval.max_context_chars", self.retrieval.max_context_chars),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("{name} must be greater than zero")));
        }
        if self.index.m < 2 {
            return Err(Error::Config("index.m must be at least 2".into()));
        }
        if self.index.nlist == Some(0) {
            return Err(Error::Config("index.nlist must be greater than zero".into()));
        }
        if !(self.index.rebuild_tombstone_ratio > 0.0 && self.index.rebuild_tombstone_ratio <= 1.0) {
            return Err(Error::Config("index.rebuild_tombstone_ratio must be in (0, 1]".into()));
        }
        if !matches!(self.embedding.model.as_str(), "hash" | "bge-m3") {
            return Err(Error::Config(format!("unknown embedding model '{}'", self.embedding.model)));
        }
        Ok(())
    }
}
