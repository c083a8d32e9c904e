//! Similarity ranking of occurrences against a reference descriptor.

use crate::types::{FeatureVector, OccurrenceId, RankedOccurrence};

/// Plain, unweighted Euclidean distance.
///
/// Vectors of different lengths are compared over their common prefix; the
/// engine never mixes grid sizes, so this only matters for foreign data.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Order `candidates` by non-decreasing distance to `reference`.
///
/// The sort is stable: equidistant candidates keep their input order. The
/// reference itself, when present among the candidates, ranks first at
/// distance zero.
pub fn rank_by_distance(reference: &FeatureVector, candidates: &[(OccurrenceId, FeatureVector)]) -> Vec<RankedOccurrence> {
    let mut ranked: Vec<RankedOccurrence> = candidates
        .iter()
        .map(|(id, vector)| RankedOccurrence {
            id: *id,
            distance: Some(euclidean_distance(reference.values(), vector.values())),
        })
        .collect();

    ranked.sort_by(|a, b| {
        let da = a.distance.unwrap_or(f64::INFINITY);
        let db = b.distance.unwrap_or(f64::INFINITY);
        da.total_cmp(&db)
    });
    ranked
}
