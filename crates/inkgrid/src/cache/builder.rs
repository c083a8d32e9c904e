//! Offline precomputation of the analysis resource.

use super::{AnalysisCache, CharacterAnalysis, FeatureDescriptor};
use crate::cluster::{ClusterParams, cluster_occurrences};
use crate::core::config::AtlasConfig;
use crate::features::{BitmapSource, FeatureExtractor};
use crate::index::OccurrenceIndex;
use crate::similarity::rank_by_distance;
use crate::types::{FeatureVector, OccurrenceId};
use crate::{InkgridError, Result};
use std::collections::BTreeMap;

/// Precompute similarity orderings and clusterings for a whole document.
///
/// Every character with at least two occurrences gets an ordering for each
/// of its occurrences as reference, plus a full clustering. Unlike live
/// analysis, the offline build requires every bitmap: a missing or
/// undecodable crop fails the build so a shipped cache is never incomplete.
///
/// # Errors
///
/// Returns the bitmap source's error, annotated with the occurrence identity.
pub async fn build_analysis(
    index: &OccurrenceIndex,
    extractor: &FeatureExtractor,
    source: &dyn BitmapSource,
    config: &AtlasConfig,
) -> Result<AnalysisCache> {
    config.validate()?;
    if extractor.grid_size() != config.feature_grid_size {
        return Err(InkgridError::validation(format!(
            "Extractor grid size {} does not match configured {}",
            extractor.grid_size(),
            config.feature_grid_size
        )));
    }

    let params = ClusterParams::from(config);
    let mut cache = AnalysisCache::new(
        index.name(),
        FeatureDescriptor {
            size: config.feature_grid_size,
            kind: config.feature_kind(),
        },
    );

    for character in index.characters() {
        let occurrences = index.occurrences_for(character);
        if occurrences.len() < 2 {
            continue;
        }

        let mut items: Vec<(OccurrenceId, FeatureVector)> = Vec::with_capacity(occurrences.len());
        for occ in &occurrences {
            let vector = extractor.vector_for(source, occ).await.map_err(|e| {
                InkgridError::image_processing_with_source(format!("Occurrence {} ({}) has no usable bitmap", occ.id, occ.file), e)
            })?;
            items.push((occ.id, vector));
        }

        let similar: BTreeMap<String, Vec<OccurrenceId>> = items
            .iter()
            .map(|(id, vector)| {
                let order = rank_by_distance(vector, &items).into_iter().map(|r| r.id).collect();
                (id.to_string(), order)
            })
            .collect();

        let clusters = cluster_occurrences(&items, &params);
        tracing::debug!(
            "Analysed '{}': {} occurrences, {} clusters",
            character,
            items.len(),
            clusters.len()
        );

        cache.insert(
            character,
            CharacterAnalysis {
                count: items.len(),
                glyph_ids: items.iter().map(|(id, _)| *id).collect(),
                similar,
                clusters,
            },
        );
    }

    tracing::info!(
        "Built analysis for '{}': {} characters, {} vectors",
        index.name(),
        cache.len(),
        extractor.memo_len()
    );
    Ok(cache)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::MemoryBitmapSource;
    use crate::types::{GridPosition, Occurrence, Rect, SourceRecord};
    use image::{DynamicImage, GrayImage, Luma};

    fn occurrence(id: u32, character: &str) -> Occurrence {
        Occurrence {
            id: OccurrenceId(id),
            character: character.to_string(),
            file: format!("g_{id}.png"),
            codepoint: None,
            source: SourceRecord {
                image: "page_00.jpg".to_string(),
                page: 0,
                grid: GridPosition { col: id, row: 0 },
                crop_box: Rect::new(0.0, 0.0, 10.0, 10.0),
                recognition: None,
            },
        }
    }

    fn glyph(ink_columns: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(24, 24, |x, _| {
            if x < ink_columns { Luma([0]) } else { Luma([255]) }
        }))
    }

    #[tokio::test]
    async fn test_build_covers_analyzable_characters() {
        let index = OccurrenceIndex::from_occurrences(
            "test",
            vec![
                occurrence(1, "之"),
                occurrence(2, "之"),
                occurrence(3, "之"),
                occurrence(4, "之"),
                occurrence(5, "和"),
            ],
        )
        .unwrap();

        let mut source = MemoryBitmapSource::new();
        for (id, ink) in [(1, 4), (2, 5), (3, 18), (4, 19), (5, 10)] {
            source.insert(format!("g_{id}.png"), glyph(ink));
        }

        let config = AtlasConfig::default();
        let extractor = FeatureExtractor::new(config.feature_grid_size);
        let cache = build_analysis(&index, &extractor, &source, &config).await.unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.character("和").is_none());
        assert_eq!(cache.feature.kind, "24x24_gray_zscore");

        let analysis = cache.character("之").unwrap();
        assert_eq!(analysis.count, 4);
        assert_eq!(analysis.similar.len(), 4);
        assert_eq!(analysis.similar["1"][0], OccurrenceId(1));
        assert_eq!(analysis.similar["1"][1], OccurrenceId(2));

        let total: usize = analysis.clusters.iter().map(|c| c.len()).sum();
        assert_eq!(total, 4);
    }

    #[tokio::test]
    async fn test_build_fails_on_missing_bitmap() {
        let index =
            OccurrenceIndex::from_occurrences("test", vec![occurrence(1, "之"), occurrence(2, "之")]).unwrap();
        let mut source = MemoryBitmapSource::new();
        source.insert("g_1.png", glyph(4));

        let config = AtlasConfig::default();
        let extractor = FeatureExtractor::new(config.feature_grid_size);
        let err = build_analysis(&index, &extractor, &source, &config).await.unwrap_err();
        assert!(err.to_string().contains("Occurrence 2"));
    }
}
