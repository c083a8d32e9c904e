//! Atlas session: one opened document and the analyses derived from it.
//!
//! A session owns the occurrence index, the optional analysis cache, the
//! feature memo and the scheduler. Queries never fail on degraded input:
//! a missing index yields an empty catalogue with an `Unavailable` status,
//! an undecodable bitmap removes only its own occurrence from analysis,
//! and an incompatible or malformed analysis cache is ignored in favour of
//! live computation.
//!
//! # Example
//!
//! ```rust,no_run
//! use inkgrid::{AtlasConfig, AtlasSession, OccurrenceId};
//!
//! # async fn example() -> inkgrid::Result<()> {
//! let session = AtlasSession::open("data/index.json", AtlasConfig::default()).await?;
//! let ranking = session.rank_similar("之", OccurrenceId(12)).await;
//! if let Some(ranking) = ranking.ready() {
//!     println!("closest to #12: {:?}", ranking.ranked.get(1));
//! }
//! # Ok(())
//! # }
//! ```

use crate::Result;
use crate::cache::{ANALYSIS_FORMAT_VERSION, AnalysisCache, IdentityLookup};
use crate::cluster::{ClusterParams, cluster_occurrences, order_clusters};
use crate::core::config::AtlasConfig;
use crate::core::io::resource_dir;
use crate::features::{BitmapSource, FeatureExtractor, FsBitmapSource};
use crate::index::{IndexStats, OccurrenceIndex, PageLayout};
use crate::locator::{Size, locate};
use crate::scheduler::{Published, Scheduler, Ticket};
use crate::similarity::rank_by_distance;
use crate::types::{
    Analysis, AnalysisOrigin, Cluster, ClusterSet, FeatureVector, Occurrence, OccurrenceId, RankedOccurrence, Ranking,
    Rect, Unavailable,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Load state of a session resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum ResourceStatus {
    Loaded,
    /// Not present, or disabled by configuration
    Absent,
    /// Present but unusable; the session continues without it
    Unavailable(String),
}

impl ResourceStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

/// Result published for the current selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum Selection {
    Ranking(Analysis<Ranking>),
    Clusters(Analysis<ClusterSet>),
}

#[derive(Default)]
struct VectorSet {
    usable: Vec<(OccurrenceId, FeatureVector)>,
    failed: Vec<OccurrenceId>,
}

impl VectorSet {
    fn vector(&self, id: OccurrenceId) -> Option<&FeatureVector> {
        self.usable.iter().find(|(candidate, _)| *candidate == id).map(|(_, vector)| vector)
    }
}

/// An opened document.
pub struct AtlasSession {
    config: AtlasConfig,
    index: OccurrenceIndex,
    index_status: ResourceStatus,
    analysis: Option<AnalysisCache>,
    analysis_status: ResourceStatus,
    extractor: FeatureExtractor,
    bitmaps: Arc<dyn BitmapSource>,
    scheduler: Scheduler<Selection>,
}

impl AtlasSession {
    /// Open the document whose index resource is at `index_path`.
    ///
    /// Bitmaps and the analysis resource are resolved next to the index.
    ///
    /// # Errors
    ///
    /// Returns `InkgridError::Validation` for an invalid configuration. Missing
    /// or malformed resources are not errors; they are reported through
    /// [`index_status`](Self::index_status) and
    /// [`analysis_status`](Self::analysis_status).
    pub async fn open(index_path: impl AsRef<Path>, config: AtlasConfig) -> Result<Self> {
        config.validate()?;
        let index_path = index_path.as_ref();
        let base = resource_dir(index_path);

        let (index, index_status) = match OccurrenceIndex::load(index_path).await {
            Ok(index) => (index, ResourceStatus::Loaded),
            Err(e) => {
                tracing::warn!(
                    "Index {} unavailable, continuing with an empty catalogue: {}",
                    index_path.display(),
                    e
                );
                (OccurrenceIndex::empty(), ResourceStatus::Unavailable(e.to_string()))
            }
        };

        let mut analysis_failure = None;
        let analysis = if config.use_analysis_cache {
            let path = base.join(&config.analysis_file_name);
            match AnalysisCache::load(&path).await {
                Ok(cache) => cache,
                Err(e) => {
                    tracing::warn!("Ignoring analysis cache {}: {}", path.display(), e);
                    analysis_failure = Some(e.to_string());
                    None
                }
            }
        } else {
            None
        };

        let mut session = Self::from_parts(config, index, analysis, Arc::new(FsBitmapSource::new(base)))?;
        session.index_status = index_status;
        if let Some(reason) = analysis_failure {
            session.analysis_status = ResourceStatus::Unavailable(reason);
        }

        tracing::info!(
            "Opened '{}': {} occurrences, analysis cache {:?}",
            session.index.name(),
            session.index.len(),
            session.analysis_status
        );
        Ok(session)
    }

    /// Assemble a session from already-loaded parts.
    ///
    /// An analysis cache built with a different feature grid is dropped.
    pub fn from_parts(
        config: AtlasConfig,
        index: OccurrenceIndex,
        analysis: Option<AnalysisCache>,
        bitmaps: Arc<dyn BitmapSource>,
    ) -> Result<Self> {
        config.validate()?;

        let (analysis, analysis_status) = match analysis {
            None => (None, ResourceStatus::Absent),
            Some(_) if !config.use_analysis_cache => (None, ResourceStatus::Absent),
            Some(cache) if !cache.is_compatible(config.feature_grid_size) => {
                let reason = format!(
                    "format version {} with feature '{}', session uses version {} with '{}'",
                    cache.version,
                    cache.feature.kind,
                    ANALYSIS_FORMAT_VERSION,
                    config.feature_kind()
                );
                tracing::warn!("Ignoring analysis cache: {}", reason);
                (None, ResourceStatus::Unavailable(reason))
            }
            Some(cache) => (Some(cache), ResourceStatus::Loaded),
        };

        Ok(Self {
            extractor: FeatureExtractor::new(config.feature_grid_size),
            scheduler: Scheduler::new(config.extraction_batch_size),
            config,
            index,
            index_status: ResourceStatus::Loaded,
            analysis,
            analysis_status,
            bitmaps,
        })
    }

    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    pub fn index(&self) -> &OccurrenceIndex {
        &self.index
    }

    pub fn index_status(&self) -> &ResourceStatus {
        &self.index_status
    }

    pub fn analysis_cache(&self) -> Option<&AnalysisCache> {
        self.analysis.as_ref()
    }

    pub fn analysis_status(&self) -> &ResourceStatus {
        &self.analysis_status
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn bitmaps(&self) -> &dyn BitmapSource {
        self.bitmaps.as_ref()
    }

    pub fn occurrences_for(&self, character: &str) -> Vec<&Occurrence> {
        self.index.occurrences_for(character)
    }

    pub fn occurrences_on_page(&self, page: u32) -> Vec<&Occurrence> {
        self.index.occurrences_on_page(page)
    }

    pub fn page_layout(&self, page: u32) -> Option<PageLayout> {
        self.index.page_layout(page)
    }

    pub fn stats(&self, top_n: usize) -> IndexStats {
        self.index.stats(top_n)
    }

    /// On-screen highlight of occurrence `id` for a page of size `natural` shown in `screen`.
    pub fn locate(&self, id: OccurrenceId, natural: Size, screen: Size) -> Option<Rect> {
        let occurrence = self.index.get(id)?;
        locate(&occurrence.source.crop_box, natural, screen)
    }

    /// Rank the occurrences of `character` by resemblance to `reference`.
    ///
    /// Served from the analysis cache when it covers the current occurrence
    /// list, computed live otherwise.
    pub async fn rank_similar(&self, character: &str, reference: OccurrenceId) -> Analysis<Ranking> {
        self.compute_ranking(character, reference, &Ticket::detached()).await
    }

    /// Partition the occurrences of `character` into variant clusters.
    pub async fn cluster_variants(&self, character: &str) -> Analysis<ClusterSet> {
        self.compute_clusters(character, &Ticket::detached()).await
    }

    /// Select `reference` as the current ranking reference.
    ///
    /// Supersedes any outstanding selection. Returns `None` when a newer
    /// selection arrived before this one finished; the result is then
    /// discarded rather than published.
    pub async fn select_reference(&self, character: &str, reference: OccurrenceId) -> Option<Analysis<Ranking>> {
        let ticket = self.scheduler.begin();
        let result = self.compute_ranking(character, reference, &ticket).await;
        self.scheduler
            .publish(&ticket, Selection::Ranking(result.clone()))
            .then_some(result)
    }

    /// Select `character` for variant clustering, superseding any outstanding selection.
    pub async fn select_character(&self, character: &str) -> Option<Analysis<ClusterSet>> {
        let ticket = self.scheduler.begin();
        let result = self.compute_clusters(character, &ticket).await;
        self.scheduler
            .publish(&ticket, Selection::Clusters(result.clone()))
            .then_some(result)
    }

    /// Observe results published for the current selection.
    pub fn subscribe(&self) -> watch::Receiver<Option<Published<Selection>>> {
        self.scheduler.subscribe()
    }

    /// Generation of the most recent selection.
    pub fn generation(&self) -> u64 {
        self.scheduler.generation()
    }

    async fn compute_ranking(&self, character: &str, reference: OccurrenceId, ticket: &Ticket) -> Analysis<Ranking> {
        let occurrences = self.index.occurrences_for(character);
        if occurrences.is_empty() {
            return Analysis::Unavailable(Unavailable::UnknownCharacter);
        }
        if !occurrences.iter().any(|occ| occ.id == reference) {
            return Analysis::Unavailable(Unavailable::UnknownReference { id: reference });
        }
        if occurrences.len() < 2 {
            return Analysis::Unavailable(Unavailable::TooFewOccurrences {
                usable: occurrences.len(),
            });
        }

        if let Some(ranking) = self.cached_ranking(character, reference, &occurrences) {
            return Analysis::Ready(ranking);
        }

        let Some(vectors) = self.collect_vectors(&occurrences, ticket).await else {
            return Analysis::Unavailable(Unavailable::Superseded);
        };
        let Some(reference_vector) = vectors.vector(reference) else {
            return Analysis::Unavailable(Unavailable::ReferenceUndecodable { id: reference });
        };
        if vectors.usable.len() < 2 {
            return Analysis::Unavailable(Unavailable::TooFewOccurrences {
                usable: vectors.usable.len(),
            });
        }

        let ranked = rank_by_distance(reference_vector, &vectors.usable);
        Analysis::Ready(Ranking {
            character: character.to_string(),
            reference,
            ranked,
            unranked: vectors.failed,
            origin: AnalysisOrigin::Live,
        })
    }

    async fn compute_clusters(&self, character: &str, ticket: &Ticket) -> Analysis<ClusterSet> {
        let occurrences = self.index.occurrences_for(character);
        if occurrences.is_empty() {
            return Analysis::Unavailable(Unavailable::UnknownCharacter);
        }
        if occurrences.len() < 2 {
            return Analysis::Unavailable(Unavailable::TooFewOccurrences {
                usable: occurrences.len(),
            });
        }

        if let Some(clusters) = self.cached_clusters(character, &occurrences) {
            return Analysis::Ready(clusters);
        }

        let Some(vectors) = self.collect_vectors(&occurrences, ticket).await else {
            return Analysis::Unavailable(Unavailable::Superseded);
        };
        if vectors.usable.len() < 2 {
            return Analysis::Unavailable(Unavailable::TooFewOccurrences {
                usable: vectors.usable.len(),
            });
        }

        let clusters = cluster_occurrences(&vectors.usable, &ClusterParams::from(&self.config));
        tracing::debug!(
            "Clustered '{}' live: {} occurrences into {} clusters, {} excluded",
            character,
            vectors.usable.len(),
            clusters.len(),
            vectors.failed.len()
        );
        Analysis::Ready(ClusterSet {
            character: character.to_string(),
            clusters,
            excluded: vectors.failed,
            origin: AnalysisOrigin::Live,
        })
    }

    fn cached_ranking(&self, character: &str, reference: OccurrenceId, occurrences: &[&Occurrence]) -> Option<Ranking> {
        let cached = self.analysis.as_ref()?.similar_ids(character, reference)?;
        let ids: Vec<OccurrenceId> = occurrences.iter().map(|occ| occ.id).collect();

        let Some(positions) = IdentityLookup::new(&ids).resolve_ordering(cached) else {
            tracing::debug!("Cached ordering for '{}' does not match the index, computing live", character);
            return None;
        };

        Some(Ranking {
            character: character.to_string(),
            reference,
            ranked: positions
                .into_iter()
                .map(|position| RankedOccurrence {
                    id: ids[position],
                    distance: None,
                })
                .collect(),
            unranked: Vec::new(),
            origin: AnalysisOrigin::Cache,
        })
    }

    fn cached_clusters(&self, character: &str, occurrences: &[&Occurrence]) -> Option<ClusterSet> {
        let cached = self.analysis.as_ref()?.clusters(character)?;
        let ids: Vec<OccurrenceId> = occurrences.iter().map(|occ| occ.id).collect();

        let Some(resolved) = IdentityLookup::new(&ids).resolve_clusters(cached) else {
            tracing::debug!("Cached clusters for '{}' do not match the index, computing live", character);
            return None;
        };

        let mut clusters: Vec<Cluster> = resolved
            .into_iter()
            .map(|cluster| Cluster {
                id: cluster.id,
                members: cluster.members.iter().map(|&position| ids[position]).collect(),
                representative: ids[cluster.representative],
            })
            .collect();
        order_clusters(&mut clusters);

        Some(ClusterSet {
            character: character.to_string(),
            clusters,
            excluded: Vec::new(),
            origin: AnalysisOrigin::Cache,
        })
    }

    /// Extract vectors in scheduler batches, yielding between batches.
    ///
    /// Returns `None` once `ticket` is superseded. Occurrences whose bitmap
    /// fails to load are reported in `failed` instead of aborting the batch.
    async fn collect_vectors(&self, occurrences: &[&Occurrence], ticket: &Ticket) -> Option<VectorSet> {
        let mut queue = self.scheduler.queue(occurrences.iter().copied());
        let mut vectors = VectorSet::default();

        while let Some(batch) = queue.next_batch() {
            for occurrence in batch {
                match self.extractor.vector_for(self.bitmaps.as_ref(), occurrence).await {
                    Ok(vector) => vectors.usable.push((occurrence.id, vector)),
                    Err(e) => {
                        tracing::warn!(
                            "Excluding occurrence {} ({}) from analysis: {}",
                            occurrence.id,
                            occurrence.file,
                            e
                        );
                        vectors.failed.push(occurrence.id);
                    }
                }
            }

            if !ticket.is_current() {
                tracing::debug!(
                    "Abandoning superseded computation with {} occurrences pending",
                    queue.remaining()
                );
                return None;
            }
            self.scheduler.tick().await;
        }

        Some(vectors)
    }
}
