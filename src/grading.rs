//! Outcome grading and the bounded learning loop.
//!
//! Runs on its own schedule, decoupled from request traffic. Each cycle:
//! grade concluded picks against the outcome collaborator, aggregate the
//! graded history into performance stats, snapshot the stats, and propose a
//! bounded weight update. The proposal is centered (deltas sum to zero, so
//! the weight sum stays 1.0) and scaled down until every engine fits both
//! the per-update delta bound and its floor/ceiling; the store re-validates
//! before the atomic publish regardless.
//!
//! The loop tunes magnitudes only. What signal feeds which engine, and
//! every tier threshold, are structural constants it cannot touch.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::confluence::ConfluenceLevel;
use crate::engines::Engine;
use crate::error::PipelineError;
use crate::ledger::{Pick, PickLedger};
use crate::state::{now_ts, ts_now, Config};
use crate::storage::StatsStore;
use crate::weights::{WeightSet, WeightStore, PILLAR_CONFLUENCE, PILLAR_CEILING, PILLAR_FLOOR};

/// Return per unit staked at standard -110 pricing.
const WIN_ROI: f64 = 0.909;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Win,
    Loss,
    Push,
    Void,
}

/// External collaborator that knows how events actually ended.
/// `None` means not yet resolved; the pick stays for the next cycle.
#[async_trait]
pub trait OutcomeSource: Send + Sync {
    async fn resolve(&self, pick: &Pick) -> Option<Outcome>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingResult {
    pub pick_id: String,
    pub actual_outcome: Outcome,
    /// None for push/void: neither correct nor incorrect.
    pub correct: Option<bool>,
    pub roi: f64,
    pub graded_at: String,
}

impl GradingResult {
    pub fn from_outcome(pick_id: &str, outcome: Outcome) -> Self {
        let (correct, roi) = match outcome {
            Outcome::Win => (Some(true), WIN_ROI),
            Outcome::Loss => (Some(false), -1.0),
            Outcome::Push | Outcome::Void => (None, 0.0),
        };
        Self {
            pick_id: pick_id.to_string(),
            actual_outcome: outcome,
            correct,
            roi,
            graded_at: ts_now(),
        }
    }
}

// =============================================================================
// Grading log: append-only, one-to-one with picks
// =============================================================================

struct GradingLogInner {
    file: File,
    graded: HashSet<String>,
}

pub struct GradingLog {
    inner: Mutex<GradingLogInner>,
}

impl GradingLog {
    pub fn open(path: &str) -> Result<Self, PipelineError> {
        let mut graded = HashSet::new();
        for g in Self::replay(path)? {
            graded.insert(g.pick_id);
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { inner: Mutex::new(GradingLogInner { file, graded }) })
    }

    /// Append one result. Idempotent by pick_id: a pick is graded once.
    pub fn record(&self, result: &GradingResult) -> Result<bool, PipelineError> {
        let mut inner = self.inner.lock().expect("grading log lock poisoned");
        if inner.graded.contains(&result.pick_id) {
            return Ok(false);
        }
        let line = serde_json::to_string(result)?;
        writeln!(inner.file, "{}", line)?;
        inner.file.flush()?;
        inner.graded.insert(result.pick_id.clone());
        Ok(true)
    }

    pub fn graded_ids(&self) -> HashSet<String> {
        self.inner.lock().expect("grading log lock poisoned").graded.clone()
    }

    pub fn replay(path: &str) -> Result<Vec<GradingResult>, PipelineError> {
        if !Path::new(path).exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(path)?;
        let mut out = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(g) = serde_json::from_str::<GradingResult>(&line) {
                out.push(g);
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Performance aggregation
// =============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BucketStats {
    pub picks: u64,
    pub wins: u64,
    pub losses: u64,
    pub pushes: u64,
    pub roi_units: f64,
}

impl BucketStats {
    fn record(&mut self, grading: &GradingResult, units: f64) {
        self.picks += 1;
        match grading.correct {
            Some(true) => self.wins += 1,
            Some(false) => self.losses += 1,
            None => self.pushes += 1,
        }
        self.roi_units += grading.roi * units;
    }

    /// Hit rate over decided picks; pushes and voids are excluded from both
    /// sides of the ratio.
    pub fn hit_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        if decided == 0 {
            None
        } else {
            Some(self.wins as f64 / decided as f64)
        }
    }

    pub fn decided(&self) -> u64 {
        self.wins + self.losses
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub overall: BucketStats,
    pub by_tier: HashMap<String, BucketStats>,
    pub by_sport: HashMap<String, BucketStats>,
    /// Per-engine attribution: picks the engine endorsed (cleared its gold
    /// gate at scoring time, as recorded in the pick's gate report).
    pub by_engine: HashMap<String, BucketStats>,
    /// Picks where confluence reached Strong or better.
    pub high_confluence: BucketStats,
}

pub fn aggregate(picks: &[Pick], gradings: &[GradingResult]) -> PerformanceStats {
    let by_id: HashMap<&str, &GradingResult> =
        gradings.iter().map(|g| (g.pick_id.as_str(), g)).collect();

    let mut stats = PerformanceStats::default();
    for pick in picks {
        let Some(grading) = by_id.get(pick.pick_id.as_str()) else {
            continue;
        };
        let units = pick.units;
        stats.overall.record(grading, units);
        stats
            .by_tier
            .entry(pick.published_tier.as_str().to_string())
            .or_default()
            .record(grading, units);
        stats
            .by_sport
            .entry(pick.scored.candidate.sport.clone())
            .or_default()
            .record(grading, units);

        let gates = &pick.scored.gates;
        for (engine, endorsed) in [
            (Engine::Ai, gates.ai),
            (Engine::Research, gates.research),
            (Engine::Jarvis, gates.jarvis),
            (Engine::Esoteric, gates.esoteric),
        ] {
            if endorsed {
                stats
                    .by_engine
                    .entry(engine.as_str().to_string())
                    .or_default()
                    .record(grading, units);
            }
        }

        if pick.scored.confluence_level >= ConfluenceLevel::Strong {
            stats.high_confluence.record(grading, units);
        }
    }
    stats
}

// =============================================================================
// Bounded weight proposal
// =============================================================================

/// Build a proposed WeightSet from the aggregated stats, or None when the
/// sample is too small. Deltas are centered so the sum stays 1.0, then the
/// whole adjustment is scaled down until every engine fits the per-update
/// bound and its floor/ceiling.
pub fn propose_weights(
    stats: &PerformanceStats,
    current: &WeightSet,
    cfg: &Config,
) -> Option<WeightSet> {
    if (stats.overall.decided() as usize) < cfg.min_graded_for_update {
        return None;
    }
    let overall_rate = stats.overall.hit_rate()?;

    let mut deltas = [0.0f64; 4];
    for (i, engine) in Engine::ALL.iter().enumerate() {
        let rate = stats
            .by_engine
            .get(engine.as_str())
            .and_then(|b| b.hit_rate())
            .unwrap_or(overall_rate);
        deltas[i] = current.learning_rate.rate * (rate - overall_rate);
    }

    // Center: zero-sum deltas keep the weight sum at exactly 1.0.
    let mean = deltas.iter().sum::<f64>() / deltas.len() as f64;
    for d in &mut deltas {
        *d -= mean;
    }

    // Scale the whole adjustment down until every engine fits the delta
    // bound and its range. Scaling preserves the zero sum.
    let mut scale: f64 = 1.0;
    for (i, engine) in Engine::ALL.iter().enumerate() {
        let d = deltas[i];
        if d.abs() > cfg.max_weight_delta {
            scale = scale.min(cfg.max_weight_delta / d.abs());
        }
        let w = current.engine_weights.get(*engine);
        if d > 0.0 {
            scale = scale.min(((cfg.weight_ceiling - w) / d).max(0.0));
        } else if d < 0.0 {
            scale = scale.min(((w - cfg.weight_floor) / -d).max(0.0));
        }
    }

    let mut proposed = current.clone();
    for (i, engine) in Engine::ALL.iter().enumerate() {
        let w = current.engine_weights.get(*engine) + deltas[i] * scale;
        proposed.engine_weights.set(*engine, w);
    }

    // Confluence pillar follows trigger performance, same bounded shape.
    if let Some(conf_rate) = stats.high_confluence.hit_rate() {
        let pillar = current.pillar(PILLAR_CONFLUENCE);
        let delta = (current.learning_rate.rate * (conf_rate - overall_rate))
            .clamp(-cfg.max_weight_delta, cfg.max_weight_delta);
        proposed
            .pillar_adjustments
            .insert(PILLAR_CONFLUENCE.to_string(), (pillar + delta).clamp(PILLAR_FLOOR, PILLAR_CEILING));
    }

    proposed.learning_rate.rate *= proposed.learning_rate.decay;
    proposed.learning_rate.cycles_applied += 1;
    Some(proposed)
}

// =============================================================================
// Grading engine
// =============================================================================

#[derive(Debug, Default, Serialize)]
pub struct CycleReport {
    pub graded_now: usize,
    pub pending: usize,
    pub total_graded: usize,
    pub published_version: Option<u64>,
    pub rejected_update: Option<String>,
}

pub struct GradingEngine<S: OutcomeSource> {
    cfg: Config,
    source: S,
}

impl<S: OutcomeSource> GradingEngine<S> {
    pub fn new(cfg: Config, source: S) -> Self {
        Self { cfg, source }
    }

    /// One full cycle: grade, aggregate, snapshot, propose-and-publish.
    /// A rejected update keeps the prior weight version current; grading
    /// results already written stay written.
    pub async fn run_grading_cycle(
        &self,
        log: &GradingLog,
        store: &WeightStore,
        stats_store: Option<&StatsStore>,
    ) -> Result<CycleReport, PipelineError> {
        let picks = PickLedger::replay(&self.cfg.ledger_path)?;
        let already = log.graded_ids();
        let now = now_ts();

        let mut report = CycleReport::default();
        for pick in &picks {
            if already.contains(&pick.pick_id) {
                continue;
            }
            if now < pick.scored.candidate.start_time + self.cfg.grade_delay_secs {
                report.pending += 1;
                continue;
            }
            match self.source.resolve(pick).await {
                Some(outcome) => {
                    let result = GradingResult::from_outcome(&pick.pick_id, outcome);
                    if log.record(&result)? {
                        report.graded_now += 1;
                    }
                }
                None => report.pending += 1,
            }
        }

        let gradings = GradingLog::replay(&self.cfg.grading_path)?;
        report.total_graded = gradings.len();
        let stats = aggregate(&picks, &gradings);

        if let Some(db) = stats_store {
            db.persist_cycle(now, &stats)?;
        }

        let current = store.current();
        if let Some(proposed) = propose_weights(&stats, &current, &self.cfg) {
            match store.publish(proposed) {
                Ok(published) => report.published_version = Some(published.version),
                // Keep serving the prior version; surface the rejection.
                Err(e) => report.rejected_update = Some(e.to_string()),
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::{GateReport, Tier};

    fn bucket(wins: u64, losses: u64) -> BucketStats {
        BucketStats { picks: wins + losses, wins, losses, pushes: 0, roi_units: 0.0 }
    }

    fn stats_with_engine_rates(overall: (u64, u64), ai: (u64, u64)) -> PerformanceStats {
        let mut stats = PerformanceStats {
            overall: bucket(overall.0, overall.1),
            ..Default::default()
        };
        stats.by_engine.insert("ai".to_string(), bucket(ai.0, ai.1));
        stats
    }

    #[test]
    fn grading_result_maps_outcomes() {
        let g = GradingResult::from_outcome("p1", Outcome::Win);
        assert_eq!(g.correct, Some(true));
        assert!((g.roi - WIN_ROI).abs() < 1e-9);

        let g = GradingResult::from_outcome("p1", Outcome::Loss);
        assert_eq!(g.correct, Some(false));
        assert!((g.roi + 1.0).abs() < 1e-9);

        let g = GradingResult::from_outcome("p1", Outcome::Push);
        assert_eq!(g.correct, None);
        assert_eq!(g.roi, 0.0);
    }

    #[test]
    fn push_excluded_from_hit_rate() {
        let mut b = BucketStats::default();
        b.record(&GradingResult::from_outcome("a", Outcome::Win), 1.0);
        b.record(&GradingResult::from_outcome("b", Outcome::Loss), 1.0);
        b.record(&GradingResult::from_outcome("c", Outcome::Push), 1.0);
        assert_eq!(b.picks, 3);
        assert_eq!(b.decided(), 2);
        assert!((b.hit_rate().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn no_proposal_below_minimum_sample() {
        let cfg = Config::from_env();
        let current = WeightSet::defaults();
        let stats = stats_with_engine_rates((10, 10), (8, 2));
        assert!(propose_weights(&stats, &current, &cfg).is_none());
    }

    #[test]
    fn proposal_is_bounded_and_sums_to_one() {
        let mut cfg = Config::from_env();
        cfg.min_graded_for_update = 25;
        let current = WeightSet::defaults();

        // ai dramatically outperforms: uncapped delta would be large.
        let mut stats = stats_with_engine_rates((60, 60), (50, 5));
        stats.by_engine.insert("research".to_string(), bucket(20, 30));

        let proposed = propose_weights(&stats, &current, &cfg).unwrap();
        let w = proposed.engine_weights;
        assert!((w.sum() - 1.0).abs() < 1e-9);
        for engine in Engine::ALL {
            let delta =
                (w.get(engine) - current.engine_weights.get(engine)).abs();
            assert!(delta <= cfg.max_weight_delta + 1e-9, "{} delta {}", engine.as_str(), delta);
            assert!(w.get(engine) >= cfg.weight_floor - 1e-9);
            assert!(w.get(engine) <= cfg.weight_ceiling + 1e-9);
        }
        // The winner's weight moved up.
        assert!(w.ai > current.engine_weights.ai);
        // Learning rate decayed.
        assert!(proposed.learning_rate.rate < current.learning_rate.rate);
        assert_eq!(proposed.learning_rate.cycles_applied, 1);
    }

    #[test]
    fn proposal_survives_store_validation() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::from_env();
        cfg.weights_path = dir.path().join("w.json").to_string_lossy().into_owned();
        cfg.weights_history_path =
            dir.path().join("wh.jsonl").to_string_lossy().into_owned();

        let store = WeightStore::open(cfg.clone()).unwrap();
        let mut stats = stats_with_engine_rates((60, 60), (45, 15));
        stats.by_engine.insert("esoteric".to_string(), bucket(20, 40));

        let proposed = propose_weights(&stats, &store.current(), &cfg).unwrap();
        let published = store.publish(proposed).unwrap();
        assert_eq!(published.version, 2);
    }

    #[test]
    fn aggregate_buckets_by_tier_sport_and_gates() {
        use crate::candidate::{Candidate, MarketKind, SideSignals};
        use crate::engines::{EngineScore, EngineScoreSet};
        use crate::pipeline::score_candidate;

        let cfg = Config::from_env();
        let ws = WeightSet::defaults();
        let mk = |key: &str, sport: &str, esoteric: f64| {
            let cand = Candidate {
                sport: sport.to_string(),
                market_kind: MarketKind::Game,
                matchup_or_player: format!("m-{}", key),
                line: -1.5,
                side: "home".to_string(),
                start_time: 1_750_000_000,
                candidate_key: key.to_string(),
                scores: EngineScoreSet {
                    ai: EngineScore::active(7.8),
                    research: EngineScore::active(7.6),
                    esoteric: EngineScore::active(esoteric),
                    jarvis: EngineScore::active(7.5),
                },
                signals: SideSignals::default(),
            };
            let scored = score_candidate(&cand, &ws, &cfg).unwrap();
            assert!(scored.tier >= Tier::EdgeLean);
            crate::ledger::Pick::from_scored(&scored)
        };

        let p1 = mk("k1", "nba", 7.4); // esoteric gate passes
        let p2 = mk("k2", "nfl", 4.0); // esoteric gate fails
        let gates: GateReport = p2.scored.gates;
        assert!(!gates.esoteric);

        let gradings = vec![
            GradingResult::from_outcome(&p1.pick_id, Outcome::Win),
            GradingResult::from_outcome(&p2.pick_id, Outcome::Loss),
        ];
        let stats = aggregate(&[p1, p2], &gradings);

        assert_eq!(stats.overall.picks, 2);
        assert_eq!(stats.by_sport.get("nba").unwrap().wins, 1);
        assert_eq!(stats.by_sport.get("nfl").unwrap().losses, 1);
        // esoteric endorsed only the winning pick
        let esoteric = stats.by_engine.get("esoteric").unwrap();
        assert_eq!(esoteric.picks, 1);
        assert_eq!(esoteric.wins, 1);
        // ai endorsed both
        assert_eq!(stats.by_engine.get("ai").unwrap().picks, 2);
    }
}
