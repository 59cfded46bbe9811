use std::collections::HashSet;

use rand::seq::{index, IndexedRandom};
use rand::Rng;

use super::corpus::ScoredVideo;
use crate::error::LaunchError;

/// Slant interval of one cohort: `lower < score <= upper`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohortBounds {
    pub label: &'static str,
    pub lower: f64,
    pub upper: f64,
}

impl CohortBounds {
    pub fn contains(&self, score: f64) -> bool {
        score > self.lower && score <= self.upper
    }
}

/// Cohorts in launch order; disjoint, together covering (-1.1, 1.1]
pub const COHORT_BOUNDS: [CohortBounds; 5] = [
    CohortBounds { label: "Left", lower: -1.1, upper: -0.6 },
    CohortBounds { label: "CenterLeft", lower: -0.6, upper: -0.2 },
    CohortBounds { label: "Center", lower: -0.2, upper: 0.2 },
    CohortBounds { label: "CenterRight", lower: 0.2, upper: 0.6 },
    CohortBounds { label: "Right", lower: 0.6, upper: 1.1 },
];

/// Candidate training videos of one cohort
#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    pub label: String,
    /// Distinct ids in corpus order
    pub video_ids: Vec<String>,
}

/// Partition a scored corpus into cohorts.
///
/// Every video lands in at most one cohort; videos scored outside all
/// intervals (or NaN) land in none. The result follows the order of `bounds`.
pub fn partition_cohorts(corpus: &[ScoredVideo], bounds: &[CohortBounds]) -> Vec<Cohort> {
    bounds
        .iter()
        .map(|b| {
            let mut seen = HashSet::new();
            let video_ids = corpus
                .iter()
                .filter(|v| b.contains(v.score))
                .filter(|v| seen.insert(v.video_id.as_str()))
                .map(|v| v.video_id.clone())
                .collect();
            Cohort {
                label: b.label.to_string(),
                video_ids,
            }
        })
        .collect()
}

/// Draw `2 * n` distinct ids without replacement; the surplus is a reserve
/// for videos that turn out to be unavailable
pub fn select_training_set<R: Rng + ?Sized>(
    cohort: &Cohort,
    n: usize,
    rng: &mut R,
) -> Result<Vec<String>, LaunchError> {
    let required = n * 2;
    let available = cohort.video_ids.len();
    if available < required {
        return Err(LaunchError::InsufficientData {
            cohort: cohort.label.clone(),
            required,
            available,
        });
    }

    Ok(index::sample(rng, available, required)
        .into_iter()
        .map(|i| cohort.video_ids[i].clone())
        .collect())
}

/// Pick one seed uniformly at random
pub fn choose_seed<R: Rng + ?Sized>(seeds: &[String], rng: &mut R) -> Result<String, LaunchError> {
    seeds.choose(rng).cloned().ok_or(LaunchError::EmptyPool)
}
