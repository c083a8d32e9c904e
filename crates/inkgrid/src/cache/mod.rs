//! Precomputed analysis cache.
//!
//! The analysis resource (`analysis.json`, next to `index.json`) stores, per
//! character, similarity orderings keyed by reference identity and a full
//! clustering. It is produced offline by [`build_analysis`] and consulted by
//! the session before any live computation.
//!
//! Cached results are expressed in occurrence identities. They are translated
//! into positions of the caller's current list by identity lookup, never by
//! raw position, because the caller's list order may differ from the order
//! the cache was built with. A cached entry that does not describe exactly
//! the caller's occurrences is treated as a miss.
//!
//! Absence of the resource is normal and silent. A resource that exists but
//! cannot be parsed is reported as a `Cache` error, which sessions log and
//! then ignore.

mod builder;

pub use builder::build_analysis;

use crate::core::io::read_file_async;
use crate::types::{Cluster, OccurrenceId};
use crate::{InkgridError, Result};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Current analysis resource format version.
pub const ANALYSIS_FORMAT_VERSION: u32 = 1;

/// Feature configuration the cache was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    pub size: u32,
    pub kind: String,
}

/// Precomputed analysis of one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterAnalysis {
    pub count: usize,
    /// Occurrence identities, ascending
    #[serde(rename = "glyphIds")]
    pub glyph_ids: Vec<OccurrenceId>,
    /// Reference identity (as string key) to identities ordered by distance
    #[serde(default)]
    pub similar: BTreeMap<String, Vec<OccurrenceId>>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
}

/// The analysis resource of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisCache {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub feature: FeatureDescriptor,
    #[serde(default)]
    pub by_char: BTreeMap<String, CharacterAnalysis>,
}

fn default_version() -> u32 {
    ANALYSIS_FORMAT_VERSION
}

impl AnalysisCache {
    /// An empty cache for a document, to be filled by the offline builder.
    pub fn new(name: impl Into<String>, feature: FeatureDescriptor) -> Self {
        Self {
            name: name.into(),
            version: ANALYSIS_FORMAT_VERSION,
            feature,
            by_char: BTreeMap::new(),
        }
    }

    /// Parse an analysis resource.
    ///
    /// # Errors
    ///
    /// Returns `InkgridError::Cache` when the bytes are not a valid analysis document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| InkgridError::cache_with_source("Invalid analysis document", e))
    }

    /// Load the analysis resource at `path`.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub async fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let bytes = match read_file_async(path).await {
            Ok(bytes) => bytes,
            Err(InkgridError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No analysis cache at {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(InkgridError::cache_with_source(format!("Failed to read {}", path.display()), e)),
        };

        let cache = Self::from_slice(&bytes)?;
        tracing::debug!(
            "Loaded analysis cache from {}: {} characters ({})",
            path.display(),
            cache.by_char.len(),
            cache.feature.kind
        );
        Ok(Some(cache))
    }

    /// Serialize to the pretty-printed resource format.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the resource to `path`.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_json_pretty()?)?;
        Ok(())
    }

    /// True when the cache uses the current format version and was built
    /// with feature grid `grid_size`.
    pub fn is_compatible(&self, grid_size: u32) -> bool {
        self.version == ANALYSIS_FORMAT_VERSION && self.feature.size == grid_size
    }

    pub fn character(&self, character: &str) -> Option<&CharacterAnalysis> {
        self.by_char.get(character)
    }

    /// Cached ordering for `reference` among the occurrences of `character`.
    pub fn similar_ids(&self, character: &str, reference: OccurrenceId) -> Option<&[OccurrenceId]> {
        self.by_char
            .get(character)?
            .similar
            .get(&reference.to_string())
            .map(Vec::as_slice)
    }

    /// Cached clustering of `character`.
    pub fn clusters(&self, character: &str) -> Option<&[Cluster]> {
        self.by_char
            .get(character)
            .map(|analysis| analysis.clusters.as_slice())
            .filter(|clusters| !clusters.is_empty())
    }

    pub fn insert(&mut self, character: impl Into<String>, analysis: CharacterAnalysis) {
        self.by_char.insert(character.into(), analysis);
    }

    pub fn len(&self) -> usize {
        self.by_char.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_char.is_empty()
    }
}

/// Identity to position lookup over a caller's current occurrence list.
#[derive(Debug, Clone)]
pub struct IdentityLookup {
    positions: AHashMap<OccurrenceId, usize>,
}

impl IdentityLookup {
    pub fn new(current: &[OccurrenceId]) -> Self {
        Self {
            positions: current.iter().enumerate().map(|(position, id)| (*id, position)).collect(),
        }
    }

    pub fn position(&self, id: OccurrenceId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Translate a cached ordering into positions of the current list.
    ///
    /// Returns `None` unless `cached` names every current occurrence exactly once.
    pub fn resolve_ordering(&self, cached: &[OccurrenceId]) -> Option<Vec<usize>> {
        if cached.len() != self.positions.len() {
            return None;
        }

        let mut seen = vec![false; self.positions.len()];
        cached
            .iter()
            .map(|id| {
                let position = self.position(*id)?;
                if std::mem::replace(&mut seen[position], true) {
                    return None;
                }
                Some(position)
            })
            .collect()
    }

    /// Translate a cached clustering into positions of the current list.
    ///
    /// Returns `None` unless every current occurrence belongs to exactly one
    /// cluster and every representative is a member of its own cluster.
    pub fn resolve_clusters(&self, cached: &[Cluster]) -> Option<Vec<ResolvedCluster>> {
        let mut seen = vec![false; self.positions.len()];
        let mut covered = 0usize;
        let mut resolved = Vec::with_capacity(cached.len());

        for cluster in cached {
            if !cluster.contains(cluster.representative) {
                return None;
            }
            let mut members = Vec::with_capacity(cluster.members.len());
            for id in &cluster.members {
                let position = self.position(*id)?;
                if std::mem::replace(&mut seen[position], true) {
                    return None;
                }
                covered += 1;
                members.push(position);
            }
            resolved.push(ResolvedCluster {
                id: cluster.id,
                members,
                representative: self.position(cluster.representative)?,
            });
        }

        (covered == self.positions.len()).then_some(resolved)
    }
}

/// A cached cluster expressed in positions of the caller's list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCluster {
    pub id: usize,
    pub members: Vec<usize>,
    pub representative: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ids(raw: &[u32]) -> Vec<OccurrenceId> {
        raw.iter().copied().map(OccurrenceId).collect()
    }

    const SAMPLE: &str = r#"{
        "name": "兰亭集序",
        "version": 1,
        "feature": {"size": 24, "kind": "24x24_gray_zscore"},
        "by_char": {
            "之": {
                "count": 3,
                "glyphIds": [3, 5, 12],
                "similar": {"5": [5, 12, 3], "3": [3, 5, 12]},
                "clusters": [
                    {"id": 1, "members": [5, 12], "rep": 12},
                    {"id": 0, "members": [3], "rep": 3}
                ]
            }
        }
    }"#;

    #[test]
    fn test_parse_analysis_resource() {
        let cache = AnalysisCache::from_slice(SAMPLE.as_bytes()).unwrap();
        assert_eq!(cache.name, "兰亭集序");
        assert!(cache.is_compatible(24));
        assert!(!cache.is_compatible(16));
        assert_eq!(cache.similar_ids("之", OccurrenceId(5)).unwrap(), ids(&[5, 12, 3]).as_slice());
        assert!(cache.similar_ids("之", OccurrenceId(12)).is_none());
        assert!(cache.similar_ids("和", OccurrenceId(5)).is_none());
        assert_eq!(cache.clusters("之").unwrap().len(), 2);
        assert_eq!(cache.character("之").unwrap().count, 3);
    }

    #[test]
    fn test_unknown_version_is_incompatible() {
        let cache = AnalysisCache::from_slice(SAMPLE.replace("\"version\": 1", "\"version\": 2").as_bytes()).unwrap();
        assert_eq!(cache.version, 2);
        assert!(!cache.is_compatible(24));

        let unversioned = AnalysisCache::from_slice(SAMPLE.replace("\"version\": 1,", "").as_bytes()).unwrap();
        assert!(unversioned.is_compatible(24));
    }

    #[test]
    fn test_invalid_resource_is_cache_error() {
        let err = AnalysisCache::from_slice(b"{\"by_char\": 3}").unwrap_err();
        assert!(matches!(err, InkgridError::Cache { .. }));
    }

    #[test]
    fn test_identity_stability_under_translation() {
        // the live list is ordered differently from the cached ordering
        let current = ids(&[12, 3, 5]);
        let lookup = IdentityLookup::new(&current);

        let positions = lookup.resolve_ordering(&ids(&[5, 12, 3])).unwrap();
        let resolved: Vec<OccurrenceId> = positions.iter().map(|&p| current[p]).collect();
        assert_eq!(resolved, ids(&[5, 12, 3]));
        assert_eq!(positions, vec![2, 0, 1]);
    }

    #[test]
    fn test_ordering_mismatch_is_miss() {
        let lookup = IdentityLookup::new(&ids(&[3, 5, 12]));
        assert!(lookup.resolve_ordering(&ids(&[5, 12])).is_none());
        assert!(lookup.resolve_ordering(&ids(&[5, 12, 99])).is_none());
        assert!(lookup.resolve_ordering(&ids(&[5, 5, 3])).is_none());
    }

    #[test]
    fn test_resolve_clusters() {
        let cache = AnalysisCache::from_slice(SAMPLE.as_bytes()).unwrap();
        let current = ids(&[12, 5, 3]);
        let lookup = IdentityLookup::new(&current);

        let resolved = lookup.resolve_clusters(cache.clusters("之").unwrap()).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].members, vec![1, 0]);
        assert_eq!(current[resolved[0].representative], OccurrenceId(12));
        assert_eq!(resolved[1].members, vec![2]);
    }

    #[test]
    fn test_clusters_not_covering_current_list_are_miss() {
        let cache = AnalysisCache::from_slice(SAMPLE.as_bytes()).unwrap();
        let lookup = IdentityLookup::new(&ids(&[3, 5, 12, 40]));
        assert!(lookup.resolve_clusters(cache.clusters("之").unwrap()).is_none());

        let bad_rep = vec![Cluster {
            id: 0,
            members: ids(&[3, 5, 12]),
            representative: OccurrenceId(40),
        }];
        assert!(IdentityLookup::new(&ids(&[3, 5, 12])).resolve_clusters(&bad_rep).is_none());
    }

    #[tokio::test]
    async fn test_missing_resource_is_silent() {
        let dir = tempdir().unwrap();
        let cache = AnalysisCache::load(dir.path().join("analysis.json")).await.unwrap();
        assert!(cache.is_none());
    }

    #[tokio::test]
    async fn test_write_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("analysis.json");
        let cache = AnalysisCache::from_slice(SAMPLE.as_bytes()).unwrap();
        cache.write(&path).unwrap();

        let loaded = AnalysisCache::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, cache);
    }
}
