// Base composition: weighted sum of the four engine scores.

use crate::engines::{Engine, EngineScoreSet};
use crate::weights::WeightSet;

/// `base_score = Σ weight[e] · effective(score[e])` over all four engines.
///
/// Pure function of the score set and one weight snapshot. Weights sum to
/// 1.0 by store invariant; the composer never re-normalizes. Inactive
/// engines contribute the baseline, never drop out of the sum.
pub fn base_score(scores: &EngineScoreSet, weights: &WeightSet, baseline: f64) -> f64 {
    Engine::ALL
        .iter()
        .map(|e| weights.engine_weights.get(*e) * scores.effective(*e, baseline))
        .sum()
}
