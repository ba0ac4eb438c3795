//! End-to-end properties of the scoring pipeline.
//!
//! These are the invariants the system advertises: weighted composition
//! against the currently published weights, the titanium override, the
//! shared boost cap, deterministic re-runs, and the output boundary that
//! keeps internal tiers internal.

use std::sync::Arc;

use pickrank::candidate::{Candidate, MarketKind, SideSignals};
use pickrank::engines::{Engine, EngineScore, EngineScoreSet};
use pickrank::pipeline::{run_slate, score_candidate};
use pickrank::state::Config;
use pickrank::tier::Tier;
use pickrank::weights::{EngineWeights, WeightStore};

fn scores(ai: f64, research: f64, esoteric: f64, jarvis: f64) -> EngineScoreSet {
    EngineScoreSet {
        ai: EngineScore::active(ai),
        research: EngineScore::active(research),
        esoteric: EngineScore::active(esoteric),
        jarvis: EngineScore::active(jarvis),
    }
}

fn candidate(key: &str, sport: &str, matchup: &str, s: EngineScoreSet) -> Candidate {
    Candidate {
        sport: sport.to_string(),
        market_kind: MarketKind::Game,
        matchup_or_player: matchup.to_string(),
        line: -3.5,
        side: "home".to_string(),
        start_time: 1_750_000_000,
        candidate_key: key.to_string(),
        scores: s,
        signals: SideSignals::default(),
    }
}

fn weight_cfg(dir: &tempfile::TempDir) -> Config {
    let mut cfg = Config::from_env();
    cfg.weights_path = dir.path().join("weights.json").to_string_lossy().into_owned();
    cfg.weights_history_path =
        dir.path().join("weights_history.jsonl").to_string_lossy().into_owned();
    cfg
}

// ---------------------------------------------------------------------------
// Composition tracks the published WeightSet
// ---------------------------------------------------------------------------

#[test]
fn base_score_tracks_currently_published_weights() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = weight_cfg(&dir);
    let store = WeightStore::open(cfg.clone()).unwrap();

    let cand = candidate("k1", "nba", "A@B", scores(8.0, 7.0, 6.0, 5.0));

    let v1 = store.current();
    let scored = score_candidate(&cand, &v1, &cfg).unwrap();
    let expected: f64 = Engine::ALL
        .iter()
        .map(|e| v1.engine_weights.get(*e) * cand.scores.get(*e).value)
        .sum();
    assert!((scored.base_score - expected).abs() < 1e-9);
    assert!((v1.engine_weights.sum() - 1.0).abs() < 1e-9);
    assert_eq!(scored.weight_version, 1);

    // Publish a shifted set; new scoring runs see the new snapshot.
    let mut proposed = (*v1).clone();
    proposed.engine_weights =
        EngineWeights { ai: 0.34, research: 0.26, esoteric: 0.22, jarvis: 0.18 };
    store.publish(proposed).unwrap();

    let v2 = store.current();
    let rescored = score_candidate(&cand, &v2, &cfg).unwrap();
    let expected: f64 = Engine::ALL
        .iter()
        .map(|e| v2.engine_weights.get(*e) * cand.scores.get(*e).value)
        .sum();
    assert!((rescored.base_score - expected).abs() < 1e-9);
    assert!((v2.engine_weights.sum() - 1.0).abs() < 1e-9);
    assert_eq!(rescored.weight_version, 2);
    assert_ne!(scored.base_score, rescored.base_score);
}

// ---------------------------------------------------------------------------
// Titanium boundary
// ---------------------------------------------------------------------------

#[test]
fn titanium_boundary_is_inclusive_at_eight() {
    let cfg = Config::from_env();
    let dir = tempfile::tempdir().unwrap();
    let store = WeightStore::open(weight_cfg(&dir)).unwrap();
    let ws = store.current();

    let scored =
        score_candidate(&candidate("t1", "nba", "A@B", scores(8.5, 8.2, 8.1, 7.0)), &ws, &cfg)
            .unwrap();
    assert!(scored.titanium_flag);
    assert_eq!(scored.titanium_hits, 3);
    assert_eq!(scored.tier, Tier::TitaniumSmash);

    let scored =
        score_candidate(&candidate("t2", "nba", "A@B", scores(8.5, 6.0, 5.0, 4.0)), &ws, &cfg)
            .unwrap();
    assert!(!scored.titanium_flag);
    assert_eq!(scored.titanium_hits, 1);
    assert_ne!(scored.tier, Tier::TitaniumSmash);

    // 7.99 does not count; exactly 8.0 does.
    let scored =
        score_candidate(&candidate("t3", "nba", "A@B", scores(8.0, 8.0, 7.99, 8.0)), &ws, &cfg)
            .unwrap();
    assert_eq!(scored.titanium_hits, 3);
    assert!(scored.titanium_flag);
}

// ---------------------------------------------------------------------------
// Shared boost cap under saturation
// ---------------------------------------------------------------------------

#[test]
fn post_base_total_never_exceeds_shared_cap() {
    let cfg = Config::from_env();
    let dir = tempfile::tempdir().unwrap();
    let store = WeightStore::open(weight_cfg(&dir)).unwrap();
    let ws = store.current();

    // Harmonic confluence plus every market boost saturated.
    let mut cand = candidate("cap", "nba", "A@B", scores(7.6, 7.8, 7.9, 7.5));
    cand.signals = SideSignals {
        has_simulation: true,
        sim_win_prob: 1.0,
        has_consensus: true,
        consensus_pct: 1.0,
        has_sharp: true,
        sharp_pct: 95.0,
        public_pct: 10.0,
        ..Default::default()
    };

    let scored = score_candidate(&cand, &ws, &cfg).unwrap();
    assert!(scored.post_base_total <= cfg.total_boost_cap + 1e-9);
    assert!((scored.post_base_total - cfg.total_boost_cap).abs() < 1e-9);

    let applied_sum: f64 = scored
        .modifiers
        .iter()
        .filter(|m| {
            m.status == pickrank::modifiers::ModifierStatus::Applied
                && m.name != "geomagnetic"
                && m.name != "weather_severity"
                && m.name != "lineup_confidence"
                && m.name != "line_difficulty"
        })
        .map(|m| m.value)
        .sum();
    // Raw boosts exceed the cap; the recorded total is the capped value.
    assert!(applied_sum > cfg.total_boost_cap);
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn identical_inputs_yield_identical_batches() {
    let cfg = Config::from_env();
    let dir = tempfile::tempdir().unwrap();
    let store = WeightStore::open(weight_cfg(&dir)).unwrap();

    let candidates: Vec<Candidate> = (0..30)
        .map(|i| {
            let mut c = candidate(
                &format!("k{:02}", i),
                if i % 2 == 0 { "nba" } else { "nfl" },
                &format!("m{:02}", i),
                scores(
                    6.0 + (i % 4) as f64,
                    6.5 + (i % 3) as f64,
                    5.0 + (i % 5) as f64,
                    6.0 + (i % 2) as f64,
                ),
            );
            c.signals = SideSignals {
                has_simulation: true,
                sim_win_prob: 0.55 + (i % 4) as f64 * 0.1,
                has_kp: true,
                kp_index: (i % 9) as f64,
                ..Default::default()
            };
            c
        })
        .collect();

    let a = run_slate(&candidates, store.current(), &cfg);
    let b = run_slate(&candidates, store.current(), &cfg);

    assert_eq!(a.published.len(), b.published.len());
    for (x, y) in a.published.iter().zip(b.published.iter()) {
        assert_eq!(x.candidate.candidate_key, y.candidate.candidate_key);
        assert_eq!(x.final_score, y.final_score);
        assert_eq!(x.tier, y.tier);
        assert_eq!(x.confluence_level, y.confluence_level);
    }
    assert_eq!(a.skipped.len(), b.skipped.len());
}

// ---------------------------------------------------------------------------
// Concentration and the output boundary
// ---------------------------------------------------------------------------

#[test]
fn sport_cap_keeps_best_eight_of_ten() {
    let mut cfg = Config::from_env();
    cfg.max_picks_per_sport = 8;
    let dir = tempfile::tempdir().unwrap();
    let store = WeightStore::open(weight_cfg(&dir)).unwrap();

    // Ten identically-scored edge leans in one sport.
    let candidates: Vec<Candidate> = (0..10)
        .map(|i| {
            candidate(
                &format!("k{:02}", i),
                "nba",
                &format!("m{:02}", i),
                scores(7.8, 7.8, 5.5, 7.8),
            )
        })
        .collect();

    let out = run_slate(&candidates, store.current(), &cfg);
    assert_eq!(out.published.len(), 8);
    let mut keys: Vec<String> = out
        .published
        .iter()
        .map(|p| p.candidate.candidate_key.clone())
        .collect();
    keys.sort();
    assert_eq!(keys, (0..8).map(|i| format!("k{:02}", i)).collect::<Vec<_>>());
}

#[test]
fn no_batch_ever_returns_internal_tiers() {
    let cfg = Config::from_env();
    let dir = tempfile::tempdir().unwrap();
    let store = WeightStore::open(weight_cfg(&dir)).unwrap();

    // A spread of weak-to-middling candidates: monitors and passes.
    let candidates: Vec<Candidate> = (0..40)
        .map(|i| {
            candidate(
                &format!("k{:02}", i),
                "mlb",
                &format!("m{:02}", i),
                scores(
                    3.0 + (i % 5) as f64,
                    3.5 + (i % 4) as f64,
                    3.0 + (i % 3) as f64,
                    4.0 + (i % 2) as f64,
                ),
            )
        })
        .collect();

    let out = run_slate(&candidates, store.current(), &cfg);
    for p in &out.published {
        assert!(
            matches!(p.tier, Tier::EdgeLean | Tier::GoldStar | Tier::TitaniumSmash),
            "internal tier {} leaked",
            p.tier.as_str()
        );
    }
}

#[test]
fn published_picks_are_ranked_by_final_score() {
    let cfg = Config::from_env();
    let dir = tempfile::tempdir().unwrap();
    let store = WeightStore::open(weight_cfg(&dir)).unwrap();

    let candidates = vec![
        candidate("a", "nba", "m1", scores(7.8, 7.8, 5.5, 7.8)),
        candidate("b", "nba", "m2", scores(8.5, 8.2, 8.1, 8.3)),
        candidate("c", "nba", "m3", scores(7.2, 7.6, 7.6, 7.2)),
    ];
    let out = run_slate(&candidates, store.current(), &cfg);
    assert!(out.published.len() >= 2);
    for pair in out.published.windows(2) {
        assert!(pair[0].final_score >= pair[1].final_score);
    }
}
