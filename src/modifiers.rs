//! Modifier pipeline: bounded adjustments applied outside the engine
//! weighting.
//!
//! Three stages, in contract order:
//!   1. pre-base: adjusts individual engine scores, applied and frozen
//!      before the composer runs;
//!   2. post-base additive: each value clamped to its own cap, then the
//!      whole family sum clamped to one shared `total_boost_cap`, so no
//!      stack of boosts can dominate regardless of how many fire;
//!   3. environmental multiplicative: the only stage allowed to scale
//!      rather than add, applied last to the composed final score and
//!      bounded below by `env_factor_floor`.
//!
//! A modifier that reads unavailable upstream data reports Unavailable with
//! a reason and contributes zero. It never silently degrades to Error;
//! score history must stay reproducible from the recorded results.

use serde::{Deserialize, Serialize};

use crate::candidate::SideSignals;
use crate::confluence::{ConfluenceLevel, ConfluenceOutcome};
use crate::engines::{Engine, EngineScoreSet, Reason};
use crate::state::Config;
use crate::weights::{WeightSet, PILLAR_CONFLUENCE, PILLAR_ENVIRONMENT, PILLAR_MARKET};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModifierStatus {
    Applied,
    NotRelevant,
    Unavailable,
    Error,
}

/// Outcome of one modifier. `value` is zero unless `status == Applied`.
/// For additive modifiers `value` is the (already individually capped)
/// addend; for the environmental family it is the multiplicative factor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifierResult {
    pub name: String,
    pub value: f64,
    pub status: ModifierStatus,
    pub reasons: Vec<Reason>,
}

impl ModifierResult {
    fn applied(name: &str, value: f64, code: &str, text: String) -> Self {
        Self {
            name: name.to_string(),
            value,
            status: ModifierStatus::Applied,
            reasons: vec![Reason::new(code, text)],
        }
    }

    fn not_relevant(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            value: 0.0,
            status: ModifierStatus::NotRelevant,
            reasons: vec![Reason::new("modifier.not_relevant", text.to_string())],
        }
    }

    fn unavailable(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            value: 0.0,
            status: ModifierStatus::Unavailable,
            reasons: vec![Reason::new("modifier.unavailable", text.to_string())],
        }
    }
}

// =============================================================================
// Pre-base: engine-score adjustments, frozen before composition
// =============================================================================

/// Apply pre-base modifiers in place. Must run before `compose::base_score`;
/// the adjusted set is what composition, confluence, and titanium all see.
pub fn apply_pre_base(
    scores: &mut EngineScoreSet,
    signals: &SideSignals,
    cfg: &Config,
) -> Vec<ModifierResult> {
    vec![
        lineup_confidence(scores, signals, cfg),
        line_difficulty(scores, signals, cfg),
    ]
}

/// Unconfirmed lineups shrink the AI score: the ensemble was trained on
/// expected lineups, and its edge decays as confirmation drops.
fn lineup_confidence(
    scores: &mut EngineScoreSet,
    signals: &SideSignals,
    cfg: &Config,
) -> ModifierResult {
    const NAME: &str = "lineup_confidence";
    if !signals.has_lineup {
        return ModifierResult::unavailable(NAME, "lineup state not provided");
    }
    let ai = scores.get_mut(Engine::Ai);
    if !ai.active {
        return ModifierResult::not_relevant(NAME, "ai engine inactive");
    }
    let confidence = signals.lineup_confidence.clamp(0.0, 1.0);
    let shrink = cfg.lineup_shrink_max * (1.0 - confidence);
    if shrink <= 0.0 {
        return ModifierResult::not_relevant(NAME, "lineup fully confirmed");
    }
    let delta = -(ai.value * shrink);
    ai.value = (ai.value + delta).clamp(0.0, 10.0);
    ModifierResult::applied(
        NAME,
        delta,
        "lineup.shrink",
        format!("ai score shrunk {:.2} at confidence {:.2}", delta, confidence),
    )
}

/// Line difficulty shifts the Research score: lines far from key numbers
/// are easier to clear than lines sitting on them.
fn line_difficulty(
    scores: &mut EngineScoreSet,
    signals: &SideSignals,
    cfg: &Config,
) -> ModifierResult {
    const NAME: &str = "line_difficulty";
    if !signals.has_hook {
        return ModifierResult::unavailable(NAME, "key-number distance not provided");
    }
    let research = scores.get_mut(Engine::Research);
    if !research.active {
        return ModifierResult::not_relevant(NAME, "research engine inactive");
    }
    // Normalize distance into [-cap, +cap] around the 1.5-point midpoint.
    let normalized = (signals.hook_distance.min(3.0) / 3.0 - 0.5) * 2.0;
    let shift = (normalized * cfg.line_shift_cap).clamp(-cfg.line_shift_cap, cfg.line_shift_cap);
    if shift.abs() < 1e-9 {
        return ModifierResult::not_relevant(NAME, "line at neutral key-number distance");
    }
    research.value = (research.value + shift).clamp(0.0, 10.0);
    ModifierResult::applied(
        NAME,
        shift,
        "line.difficulty",
        format!(
            "research shifted {:+.2} at {:.1} points from key number",
            shift, signals.hook_distance
        ),
    )
}

// =============================================================================
// Post-base: additive boosts under one shared cap
// =============================================================================

pub struct PostBaseOutcome {
    pub results: Vec<ModifierResult>,
    /// Sum of applied values after the shared cap.
    pub total: f64,
    /// Sum before the shared cap, kept for audit.
    pub raw_sum: f64,
}

pub fn apply_post_base(
    confluence: &ConfluenceOutcome,
    signals: &SideSignals,
    weights: &WeightSet,
    cfg: &Config,
) -> PostBaseOutcome {
    let results = vec![
        confluence_boost(confluence, weights, cfg),
        simulation_boost(signals, weights, cfg),
        consensus_boost(signals, weights, cfg),
        sharp_side_boost(signals, weights, cfg),
        correlation_adjustment(signals, cfg),
        hook_discipline(signals, cfg),
    ];
    let raw_sum: f64 = results.iter().map(|r| r.value).sum();
    let total = raw_sum.clamp(-cfg.total_boost_cap, cfg.total_boost_cap);
    PostBaseOutcome { results, total, raw_sum }
}

/// The chosen confluence level's boost. This is the only place alignment
/// feeds the score; it is never summed with a generic alignment boost.
fn confluence_boost(
    confluence: &ConfluenceOutcome,
    weights: &WeightSet,
    cfg: &Config,
) -> ModifierResult {
    const NAME: &str = "confluence";
    if confluence.level == ConfluenceLevel::Divergent {
        return ModifierResult::not_relevant(NAME, "divergent alignment carries no boost");
    }
    let value = (confluence.level.boost() * weights.pillar(PILLAR_CONFLUENCE))
        .clamp(0.0, cfg.total_boost_cap);
    ModifierResult::applied(
        NAME,
        value,
        "confluence.boost",
        format!("{} confluence adds {:.2}", confluence.level.as_str(), value),
    )
}

fn simulation_boost(signals: &SideSignals, weights: &WeightSet, cfg: &Config) -> ModifierResult {
    const NAME: &str = "simulation";
    if !signals.has_simulation {
        return ModifierResult::unavailable(NAME, "simulation results not provided");
    }
    let threshold = cfg.simulation_prob_threshold;
    let prob = signals.sim_win_prob.clamp(0.0, 1.0);
    if prob < threshold {
        return ModifierResult::not_relevant(NAME, "simulation below boost threshold");
    }
    let span = (1.0 - threshold).max(1e-9);
    let value = (((prob - threshold) / span) * cfg.simulation_cap * weights.pillar(PILLAR_MARKET))
        .clamp(0.0, cfg.simulation_cap);
    ModifierResult::applied(
        NAME,
        value,
        "simulation.boost",
        format!("sim win probability {:.0}% adds {:.2}", prob * 100.0, value),
    )
}

fn consensus_boost(signals: &SideSignals, weights: &WeightSet, cfg: &Config) -> ModifierResult {
    const NAME: &str = "expert_consensus";
    if !signals.has_consensus {
        return ModifierResult::unavailable(NAME, "expert consensus not provided");
    }
    let threshold = cfg.consensus_threshold;
    let pct = signals.consensus_pct.clamp(0.0, 1.0);
    if pct < threshold {
        return ModifierResult::not_relevant(NAME, "consensus below boost threshold");
    }
    let span = (1.0 - threshold).max(1e-9);
    let value = (((pct - threshold) / span) * cfg.consensus_cap * weights.pillar(PILLAR_MARKET))
        .clamp(0.0, cfg.consensus_cap);
    ModifierResult::applied(
        NAME,
        value,
        "consensus.boost",
        format!("expert consensus {:.0}% adds {:.2}", pct * 100.0, value),
    )
}

/// Sharp money against public tickets. A 40-point divergence saturates the
/// individual cap.
fn sharp_side_boost(signals: &SideSignals, weights: &WeightSet, cfg: &Config) -> ModifierResult {
    const NAME: &str = "sharp_side";
    if !signals.has_sharp {
        return ModifierResult::unavailable(NAME, "sharp/public splits not provided");
    }
    let divergence = signals.sharp_pct - signals.public_pct;
    if divergence <= 0.0 {
        return ModifierResult::not_relevant(NAME, "no sharp/public divergence on our side");
    }
    let value = ((divergence / 40.0).clamp(0.0, 1.0)
        * cfg.sharp_cap
        * weights.pillar(PILLAR_MARKET))
    .clamp(0.0, cfg.sharp_cap);
    ModifierResult::applied(
        NAME,
        value,
        "sharp.divergence",
        format!(
            "sharp {:.0}% vs public {:.0}% adds {:.2}",
            signals.sharp_pct, signals.public_pct, value
        ),
    )
}

/// Correlated same-slate exposure is penalized per correlated pick.
fn correlation_adjustment(signals: &SideSignals, cfg: &Config) -> ModifierResult {
    const NAME: &str = "correlation";
    if !signals.has_correlation {
        return ModifierResult::unavailable(NAME, "slate correlation not provided");
    }
    if signals.correlated_picks == 0 {
        return ModifierResult::not_relevant(NAME, "no correlated exposure on slate");
    }
    let value = -((0.15 * signals.correlated_picks as f64).min(cfg.correlation_cap));
    ModifierResult::applied(
        NAME,
        value,
        "correlation.penalty",
        format!("{} correlated picks subtract {:.2}", signals.correlated_picks, -value),
    )
}

/// Lines sitting on the hook (under half a point from a key number) are
/// penalized; discipline about hooks is cheaper than losing by the hook.
fn hook_discipline(signals: &SideSignals, cfg: &Config) -> ModifierResult {
    const NAME: &str = "hook_discipline";
    if !signals.has_hook {
        return ModifierResult::unavailable(NAME, "key-number distance not provided");
    }
    if signals.hook_distance >= 0.5 {
        return ModifierResult::not_relevant(NAME, "line clear of key numbers");
    }
    let penalty = (cfg.hook_penalty_cap * (1.0 - signals.hook_distance / 0.5))
        .clamp(0.0, cfg.hook_penalty_cap);
    let value = -penalty;
    ModifierResult::applied(
        NAME,
        value,
        "hook.penalty",
        format!("line {:.2} from key number subtracts {:.2}", signals.hook_distance, -value),
    )
}

// =============================================================================
// Environmental: final multiplicative family
// =============================================================================

pub struct EnvironmentalOutcome {
    pub results: Vec<ModifierResult>,
    /// Combined factor, bounded to [env_factor_floor, 1.0].
    pub factor: f64,
}

pub fn apply_environmental(
    signals: &SideSignals,
    weights: &WeightSet,
    cfg: &Config,
) -> EnvironmentalOutcome {
    let pillar = weights.pillar(PILLAR_ENVIRONMENT);
    let results = vec![
        geomagnetic(signals, pillar, cfg),
        weather_severity(signals, pillar, cfg),
    ];
    let mut factor = 1.0;
    for r in &results {
        if r.status == ModifierStatus::Applied {
            factor *= r.value;
        }
    }
    let factor = factor.clamp(cfg.env_factor_floor, 1.0);
    EnvironmentalOutcome { results, factor }
}

// The pillar scales penalty depth, not the factor itself, so the result
// stays a discount bounded by the floor.
fn scaled_factor(base: f64, pillar: f64, cfg: &Config) -> f64 {
    (1.0 - (1.0 - base) * pillar).clamp(cfg.env_factor_floor, 1.0)
}

fn geomagnetic(signals: &SideSignals, pillar: f64, cfg: &Config) -> ModifierResult {
    const NAME: &str = "geomagnetic";
    if !signals.has_kp {
        return ModifierResult::unavailable(NAME, "geomagnetic index not provided");
    }
    let kp = signals.kp_index;
    let base = if kp >= cfg.kp_severe {
        cfg.kp_severe_factor
    } else if kp >= cfg.kp_watch {
        cfg.kp_watch_factor
    } else {
        return ModifierResult::not_relevant(NAME, "geomagnetic field quiet");
    };
    let factor = scaled_factor(base, pillar, cfg);
    ModifierResult::applied(
        NAME,
        factor,
        "geomagnetic.severity",
        format!("kp {:.1} scales final score by {:.2}", kp, factor),
    )
}

fn weather_severity(signals: &SideSignals, pillar: f64, cfg: &Config) -> ModifierResult {
    const NAME: &str = "weather_severity";
    if !signals.has_weather {
        return ModifierResult::unavailable(NAME, "weather severity not provided");
    }
    if signals.weather_severity < cfg.weather_severe_threshold {
        return ModifierResult::not_relevant(NAME, "weather below severity threshold");
    }
    let factor = scaled_factor(cfg.weather_severe_factor, pillar, cfg);
    ModifierResult::applied(
        NAME,
        factor,
        "weather.severity",
        format!(
            "weather severity {:.2} scales final score by {:.2}",
            signals.weather_severity, factor
        ),
    )
}
