use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use animal_catalog_core::Animal;
use serde::{Deserialize, Serialize};

/// Persistence seam for the catalog. Implementations own where and how the full
/// record sequence is kept between process runs.
pub trait AnimalStore: Send + Sync + Debug {
    /// Load the full record sequence.
    ///
    /// # Errors
    /// Returns an error when the backing data cannot be read or decoded.
    fn load(&self) -> Result<Vec<Animal>>;

    /// Replace the stored sequence with `animals`.
    ///
    /// # Errors
    /// Returns an error when the backing data cannot be encoded or written.
    fn persist(&self, animals: &[Animal]) -> Result<()>;

    /// Human-readable location used in logs.
    fn location(&self) -> String;
}

/// On-disk shape: one object with a single `animals` field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnimalDataset {
    pub animals: Vec<Animal>,
}

#[derive(Serialize)]
struct AnimalDatasetRef<'a> {
    animals: &'a [Animal],
}

/// Decode a dataset document.
///
/// # Errors
/// Returns an error when `body` is not a JSON object with an `animals` array of records.
pub fn parse_dataset(body: &str) -> Result<Vec<Animal>> {
    let dataset: AnimalDataset =
        serde_json::from_str(body).context("failed to parse animal dataset JSON")?;
    Ok(dataset.animals)
}

/// Encode `animals` as a pretty-printed dataset document (2-space indent).
///
/// # Errors
/// Returns an error when serialization fails.
pub fn render_dataset(animals: &[Animal]) -> Result<String> {
    serde_json::to_string_pretty(&AnimalDatasetRef { animals })
        .context("failed to serialize animal dataset")
}

/// Whole-file JSON store. Every `persist` rewrites the file from scratch.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    seed: Option<&'static str>,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), seed: None }
    }

    /// Use `seed` as the dataset when the file does not exist yet.
    #[must_use]
    pub fn with_seed(mut self, seed: &'static str) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AnimalStore for JsonFileStore {
    fn load(&self) -> Result<Vec<Animal>> {
        if self.path.exists() {
            let body = fs::read_to_string(&self.path)
                .with_context(|| format!("failed to read dataset {}", self.path.display()))?;
            return parse_dataset(&body)
                .with_context(|| format!("invalid dataset {}", self.path.display()));
        }

        match self.seed {
            Some(seed) => parse_dataset(seed).context("invalid bundled seed dataset"),
            None => Ok(Vec::new()),
        }
    }

    fn persist(&self, animals: &[Animal]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create dataset directory {}", parent.display())
            })?;
        }

        let body = render_dataset(animals)?;
        fs::write(&self.path, body)
            .with_context(|| format!("failed to write dataset {}", self.path.display()))
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
