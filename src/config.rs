//! TOML configuration for a pipeline run.
//!
//! ```toml
//! capacity = 64
//! items = 1000
//!
//! [[stages]]
//! name = "download"
//! workers = 3
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::pipeline::{PipelineBuilder, DEFAULT_CAPACITY};
use crate::worker::Transform;

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_items() -> usize {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub workers: usize,
    /// Upper bound of the simulated per-item latency, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}

impl StageConfig {
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        StageConfig {
            name: name.into(),
            workers,
            delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default = "default_items")]
    pub items: usize,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl Default for PipelineConfig {
    /// download(3) -> resize(4) -> upload(5)
    fn default() -> Self {
        PipelineConfig {
            capacity: DEFAULT_CAPACITY,
            items: default_items(),
            stages: vec![
                StageConfig::new("download", 3),
                StageConfig::new("resize", 4),
                StageConfig::new("upload", 5),
            ],
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.stages.is_empty() {
            return Err(ConfigError::NoStages);
        }

        let mut seen = HashSet::new();
        for (index, stage) in self.stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                return Err(ConfigError::BlankName { index });
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::DuplicateStage(stage.name.clone()));
            }
            if stage.workers == 0 {
                return Err(ConfigError::ZeroWorkers {
                    stage: stage.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Start a builder with one stage per `[[stages]]` entry, asking
    /// `transform_for` for each stage's transformation.
    pub fn builder<T, F>(&self, mut transform_for: F) -> PipelineBuilder<T>
    where
        T: Send + 'static,
        F: FnMut(&StageConfig) -> Transform<T>,
    {
        self.stages.iter().fold(
            PipelineBuilder::new().capacity(self.capacity),
            |builder, stage| {
                builder.stage_transform(stage.name.clone(), stage.workers, transform_for(stage))
            },
        )
    }
}
