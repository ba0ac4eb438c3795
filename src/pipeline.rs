//! Per-candidate scoring run and the parallel batch runner.
//!
//! One candidate's run is a pure function of (candidate, weight snapshot,
//! config): pre-base modifiers freeze the engine scores, the composer
//! weights them, confluence and titanium read the same adjusted set,
//! post-base boosts add under the shared cap, and the environmental family
//! scales last. Candidates score independently on worker threads; the
//! concentration filter is the only batch barrier.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::compose;
use crate::confluence::{self, ConfluenceLevel};
use crate::engines::{EngineScoreSet, Reason};
use crate::error::PipelineError;
use crate::filter;
use crate::modifiers::{self, ModifierResult, ModifierStatus};
use crate::state::Config;
use crate::tier::{self, GateReport, Tier};
use crate::weights::WeightSet;

/// Full audit record for one scored candidate. Everything needed to
/// re-derive `tier` offline is here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    /// Engine scores after pre-base adjustment; what composition saw.
    pub adjusted_scores: EngineScoreSet,
    pub base_score: f64,
    pub modifiers: Vec<ModifierResult>,
    pub confluence_level: ConfluenceLevel,
    pub alignment: f64,
    pub titanium_flag: bool,
    pub titanium_hits: usize,
    /// Post-base sum after the shared cap.
    pub post_base_total: f64,
    pub environmental_factor: f64,
    pub final_score: f64,
    pub tier: Tier,
    pub gates: GateReport,
    pub weight_version: u64,
    pub reasons: Vec<Reason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub candidate_key: String,
    pub reason: String,
}

/// What a request sees: every published pick plus a summary of skips.
/// Monitor/Pass never appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub published: Vec<ScoredCandidate>,
    pub skipped: Vec<SkippedCandidate>,
}

pub fn score_candidate(
    candidate: &Candidate,
    weights: &WeightSet,
    cfg: &Config,
) -> Result<ScoredCandidate, PipelineError> {
    candidate.scores.validate(&candidate.candidate_key)?;

    // Stage 1: pre-base modifiers, frozen before composition.
    let mut adjusted = candidate.scores.clone();
    let mut modifier_results = modifiers::apply_pre_base(&mut adjusted, &candidate.signals, cfg);

    let base_score = compose::base_score(&adjusted, weights, cfg.engine_baseline);

    // Confluence and titanium both read the frozen adjusted set.
    let conf = confluence::evaluate(&adjusted, &candidate.signals, cfg);
    let titanium = confluence::titanium(&adjusted, cfg);

    // Stage 2: post-base boosts under the shared cap.
    let post = modifiers::apply_post_base(&conf, &candidate.signals, weights, cfg);
    let post_base_total = post.total;
    modifier_results.extend(post.results);

    // Stage 3: environmental scaling, the only multiplicative stage.
    let env = modifiers::apply_environmental(&candidate.signals, weights, cfg);
    let environmental_factor = env.factor;
    modifier_results.extend(env.results);

    let final_score = ((base_score + post_base_total) * environmental_factor).clamp(0.0, 10.0);

    let decision = tier::assign(final_score, titanium.flag, &adjusted, conf.level, cfg);

    let mut reasons = adjusted.all_reasons();
    reasons.extend(conf.reasons.clone());
    for m in &modifier_results {
        if m.status == ModifierStatus::Applied {
            reasons.extend(m.reasons.iter().cloned());
        }
    }
    reasons.push(Reason::new(
        "tier.assigned",
        format!(
            "{} at final score {:.2} (base {:.2}, boosts {:+.2}, env x{:.2})",
            decision.tier.as_str(),
            final_score,
            base_score,
            post_base_total,
            environmental_factor
        ),
    ));

    Ok(ScoredCandidate {
        candidate: candidate.clone(),
        adjusted_scores: adjusted,
        base_score,
        modifiers: modifier_results,
        confluence_level: conf.level,
        alignment: conf.alignment,
        titanium_flag: titanium.flag,
        titanium_hits: titanium.hits,
        post_base_total,
        environmental_factor,
        final_score,
        tier: decision.tier,
        gates: decision.gates,
        weight_version: weights.version,
        reasons,
    })
}

/// Score a whole slate in parallel. Input order is preserved; per-candidate
/// failures are isolated into the skip list, never fail the batch.
pub fn score_batch(
    candidates: &[Candidate],
    weights: &Arc<WeightSet>,
    cfg: &Config,
) -> (Vec<ScoredCandidate>, Vec<SkippedCandidate>) {
    if candidates.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let workers = num_cpus::get().clamp(1, candidates.len());
    let chunk = (candidates.len() + workers - 1) / workers;
    let mut slots: Vec<Option<Result<ScoredCandidate, PipelineError>>> =
        (0..candidates.len()).map(|_| None).collect();

    std::thread::scope(|scope| {
        for (in_chunk, out_chunk) in candidates.chunks(chunk).zip(slots.chunks_mut(chunk)) {
            let ws = weights.clone();
            scope.spawn(move || {
                for (candidate, slot) in in_chunk.iter().zip(out_chunk.iter_mut()) {
                    *slot = Some(score_candidate(candidate, &ws, cfg));
                }
            });
        }
    });

    let mut scored = Vec::with_capacity(candidates.len());
    let mut skipped = Vec::new();
    for (candidate, slot) in candidates.iter().zip(slots) {
        match slot {
            Some(Ok(s)) => scored.push(s),
            Some(Err(e)) => skipped.push(SkippedCandidate {
                candidate_key: candidate.candidate_key.clone(),
                reason: e.to_string(),
            }),
            None => skipped.push(SkippedCandidate {
                candidate_key: candidate.candidate_key.clone(),
                reason: "scoring worker did not complete".to_string(),
            }),
        }
    }
    (scored, skipped)
}

/// Score, then shape the batch: the concentration filter is the single
/// full-batch barrier, and the output boundary where Monitor/Pass die.
pub fn run_slate(candidates: &[Candidate], weights: Arc<WeightSet>, cfg: &Config) -> BatchOutcome {
    let (scored, skipped) = score_batch(candidates, &weights, cfg);
    let published = filter::concentrate(scored, cfg);
    debug_assert!(published.iter().all(|p| p.tier.is_persisted()));
    BatchOutcome { published, skipped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{MarketKind, SideSignals};
    use crate::engines::EngineScore;

    fn candidate(key: &str, ai: f64, research: f64, esoteric: f64, jarvis: f64) -> Candidate {
        Candidate {
            sport: "nba".to_string(),
            market_kind: MarketKind::Game,
            matchup_or_player: "BOS@NYK".to_string(),
            line: -3.0,
            side: "BOS -3".to_string(),
            start_time: 1_750_000_000,
            candidate_key: key.to_string(),
            scores: EngineScoreSet {
                ai: EngineScore::active(ai),
                research: EngineScore::active(research),
                esoteric: EngineScore::active(esoteric),
                jarvis: EngineScore::active(jarvis),
            },
            signals: SideSignals::default(),
        }
    }

    fn cfg() -> Config {
        Config::from_env()
    }

    #[test]
    fn scoring_is_deterministic_across_reruns() {
        let c = cfg();
        let ws = WeightSet::defaults();
        let mut cand = candidate("k1", 8.1, 7.9, 7.8, 8.0);
        cand.signals = SideSignals {
            has_simulation: true,
            sim_win_prob: 0.71,
            has_sharp: true,
            sharp_pct: 70.0,
            public_pct: 35.0,
            has_kp: true,
            kp_index: 5.5,
            ..Default::default()
        };

        let a = score_candidate(&cand, &ws, &c).unwrap();
        let b = score_candidate(&cand, &ws, &c).unwrap();
        assert_eq!(a.final_score, b.final_score);
        assert_eq!(a.tier, b.tier);
        assert_eq!(a.confluence_level, b.confluence_level);
        assert_eq!(a.weight_version, b.weight_version);
    }

    #[test]
    fn titanium_flag_forces_top_tier_through_pipeline() {
        let c = cfg();
        let ws = WeightSet::defaults();
        // Severe environment drags final score down, titanium still wins.
        let mut cand = candidate("k1", 8.5, 8.2, 8.1, 2.0);
        cand.signals = SideSignals { has_kp: true, kp_index: 8.0, ..Default::default() };

        let scored = score_candidate(&cand, &ws, &c).unwrap();
        assert!(scored.titanium_flag);
        assert_eq!(scored.titanium_hits, 3);
        assert_eq!(scored.tier, Tier::TitaniumSmash);
    }

    #[test]
    fn invalid_candidate_is_skipped_not_fatal() {
        let c = cfg();
        let ws = Arc::new(WeightSet::defaults());
        let good = candidate("good", 7.0, 7.0, 7.0, 7.0);
        let bad = candidate("bad", 11.0, 7.0, 7.0, 7.0);

        let (scored, skipped) = score_batch(&[good, bad], &ws, &c);
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].candidate.candidate_key, "good");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].candidate_key, "bad");
        assert!(skipped[0].reason.contains("outside [0,10]"));
    }

    #[test]
    fn batch_and_sequential_scoring_agree() {
        let c = cfg();
        let ws = Arc::new(WeightSet::defaults());
        let candidates: Vec<Candidate> = (0..50)
            .map(|i| {
                candidate(
                    &format!("k{:03}", i),
                    5.0 + (i % 5) as f64,
                    6.0 + (i % 4) as f64,
                    4.0 + (i % 6) as f64,
                    5.5 + (i % 3) as f64,
                )
            })
            .collect();

        let (parallel, skipped) = score_batch(&candidates, &ws, &c);
        assert!(skipped.is_empty());
        assert_eq!(parallel.len(), candidates.len());
        for (cand, scored) in candidates.iter().zip(&parallel) {
            let solo = score_candidate(cand, &ws, &c).unwrap();
            assert_eq!(cand.candidate_key, scored.candidate.candidate_key);
            assert_eq!(solo.final_score, scored.final_score);
            assert_eq!(solo.tier, scored.tier);
        }
    }

    #[test]
    fn run_slate_never_publishes_internal_tiers() {
        let c = cfg();
        let ws = Arc::new(WeightSet::defaults());
        let candidates: Vec<Candidate> = (0..20)
            .map(|i| candidate(&format!("k{:02}", i), 5.0, 5.0, 5.0, 5.0))
            .collect();

        let out = run_slate(&candidates, ws, &c);
        assert!(out.published.iter().all(|p| p.tier.is_persisted()));
    }
}
