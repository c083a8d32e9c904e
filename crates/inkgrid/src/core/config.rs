//! Configuration loading and management.
//!
//! [`AtlasConfig`] holds the tunable constants of the engine. It can be
//! loaded from TOML, YAML or JSON, discovered as `inkgrid.toml` in the
//! directory hierarchy, or built programmatically.

use crate::core::io::read_file_sync;
use crate::{InkgridError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name searched for by [`AtlasConfig::discover`].
pub const CONFIG_FILE_NAME: &str = "inkgrid.toml";

/// Engine configuration for one document session.
///
/// # Example
///
/// ```rust
/// use inkgrid::core::config::AtlasConfig;
///
/// let config = AtlasConfig::default();
/// assert_eq!(config.feature_grid_size, 24);
/// assert_eq!(config.kmeans_iterations, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// Side length of the square grid bitmaps are downsampled to.
    ///
    /// Feature vectors have `feature_grid_size²` elements. Vectors built with
    /// different grid sizes are not comparable.
    #[serde(default = "default_grid_size")]
    pub feature_grid_size: u32,

    /// Number of assign/update rounds the clusterer runs
    #[serde(default = "default_iterations")]
    pub kmeans_iterations: usize,

    /// Lower bound on the number of clusters
    #[serde(default = "default_min_clusters")]
    pub min_clusters: usize,

    /// Upper bound on the number of clusters
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,

    /// Occurrences whose vectors are extracted per scheduler tick before the
    /// computation yields back to the host.
    #[serde(default = "default_batch_size")]
    pub extraction_batch_size: usize,

    /// Consult the precomputed analysis resource before computing live
    #[serde(default = "default_true")]
    pub use_analysis_cache: bool,

    /// Analysis resource file name, resolved next to the index resource
    #[serde(default = "default_analysis_file_name")]
    pub analysis_file_name: String,
}

fn default_grid_size() -> u32 {
    24
}
fn default_iterations() -> usize {
    10
}
fn default_min_clusters() -> usize {
    2
}
fn default_max_clusters() -> usize {
    5
}
fn default_batch_size() -> usize {
    8
}
fn default_true() -> bool {
    true
}
fn default_analysis_file_name() -> String {
    "analysis.json".to_string()
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            feature_grid_size: default_grid_size(),
            kmeans_iterations: default_iterations(),
            min_clusters: default_min_clusters(),
            max_clusters: default_max_clusters(),
            extraction_batch_size: default_batch_size(),
            use_analysis_cache: true,
            analysis_file_name: default_analysis_file_name(),
        }
    }
}

impl AtlasConfig {
    /// Check the configuration for values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `InkgridError::Validation` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.feature_grid_size < 2 {
            return Err(InkgridError::validation(format!(
                "feature_grid_size must be at least 2, got {}",
                self.feature_grid_size
            )));
        }
        if self.kmeans_iterations == 0 {
            return Err(InkgridError::validation("kmeans_iterations must be at least 1"));
        }
        if self.min_clusters == 0 || self.min_clusters > self.max_clusters {
            return Err(InkgridError::validation(format!(
                "cluster bounds must satisfy 1 <= min_clusters <= max_clusters, got {}..={}",
                self.min_clusters, self.max_clusters
            )));
        }
        if self.extraction_batch_size == 0 {
            return Err(InkgridError::validation("extraction_batch_size must be at least 1"));
        }
        if self.analysis_file_name.trim().is_empty() {
            return Err(InkgridError::validation("analysis_file_name must not be empty"));
        }
        Ok(())
    }

    /// Identifier of the feature configuration, stored in analysis resources.
    pub fn feature_kind(&self) -> String {
        format!("{0}x{0}_gray_zscore", self.feature_grid_size)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `InkgridError::Validation` if the file doesn't exist or is invalid TOML.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;

        toml::from_str(&content)
            .map_err(|e| InkgridError::validation(format!("Invalid TOML in {}: {}", path.as_ref().display(), e)))
    }

    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;

        serde_yaml_ng::from_str(&content)
            .map_err(|e| InkgridError::validation(format!("Invalid YAML in {}: {}", path.as_ref().display(), e)))
    }

    /// Load configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = read_config(path.as_ref())?;

        serde_json::from_str(&content)
            .map_err(|e| InkgridError::validation(format!("Invalid JSON in {}: {}", path.as_ref().display(), e)))
    }

    /// Load configuration choosing the format from the file extension.
    ///
    /// `.yaml`/`.yml` and `.json` are recognised; anything else is read as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Discover configuration file in parent directories.
    ///
    /// Searches for `inkgrid.toml` in the current directory and its parents.
    ///
    /// # Returns
    ///
    /// - `Some(config)` if found
    /// - `None` if no config file found
    pub fn discover() -> Result<Option<Self>> {
        let mut current = std::env::current_dir().map_err(InkgridError::Io)?;

        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Ok(Some(Self::from_toml_file(candidate)?));
            }

            if let Some(parent) = current.parent() {
                current = parent.to_path_buf();
            } else {
                break;
            }
        }

        Ok(None)
    }
}

fn read_config(path: &Path) -> Result<String> {
    let bytes = read_file_sync(path)
        .map_err(|e| InkgridError::validation(format!("Failed to read config file {}: {}", path.display(), e)))?;
    String::from_utf8(bytes)
        .map_err(|e| InkgridError::validation_with_source(format!("Config file {} is not UTF-8", path.display()), e))
}
