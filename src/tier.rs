//! Tier assignment: the single source of truth mapping a fully-scored
//! candidate to a tier.
//!
//! The order of the table is the contract: titanium first, then the gold
//! gates, then the explicit downgrade path, then the internal-only tiers.
//! Gate order and precedence are testable in isolation; nothing else in the
//! crate decides a tier.

use serde::{Deserialize, Serialize};

use crate::confluence::ConfluenceLevel;
use crate::engines::{Engine, EngineScoreSet};
use crate::state::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Pass,
    Monitor,
    EdgeLean,
    GoldStar,
    TitaniumSmash,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Pass => "pass",
            Tier::Monitor => "monitor",
            Tier::EdgeLean => "edge_lean",
            Tier::GoldStar => "gold_star",
            Tier::TitaniumSmash => "titanium_smash",
        }
    }

    /// Stake size in units for the tier.
    pub fn units(&self) -> f64 {
        match self {
            Tier::Pass => 0.0,
            Tier::Monitor => 0.0,
            Tier::EdgeLean => 1.5,
            Tier::GoldStar => 3.0,
            Tier::TitaniumSmash => 5.0,
        }
    }

    /// Only these tiers are ever written to the ledger or returned to
    /// callers. Monitor/Pass exist for audit visibility and are filtered at
    /// the output boundary even in debug views.
    pub fn is_persisted(&self) -> bool {
        matches!(self, Tier::EdgeLean | Tier::GoldStar | Tier::TitaniumSmash)
    }
}

/// Which gold gates passed, recorded for audit regardless of the tier taken.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateReport {
    pub ai: bool,
    pub research: bool,
    pub jarvis: bool,
    pub esoteric: bool,
    pub score_gate: bool,
}

impl GateReport {
    pub fn all_engine_gates_pass(&self) -> bool {
        self.ai && self.research && self.jarvis && self.esoteric
    }
}

pub struct TierDecision {
    pub tier: Tier,
    pub gates: GateReport,
}

pub fn assign(
    final_score: f64,
    titanium_flag: bool,
    scores: &EngineScoreSet,
    confluence: ConfluenceLevel,
    cfg: &Config,
) -> TierDecision {
    let b = cfg.engine_baseline;
    let gates = GateReport {
        ai: scores.effective(Engine::Ai, b) >= cfg.gold_gate_ai,
        research: scores.effective(Engine::Research, b) >= cfg.gold_gate_research,
        jarvis: scores.effective(Engine::Jarvis, b) >= cfg.gold_gate_jarvis,
        esoteric: scores.effective(Engine::Esoteric, b) >= cfg.gold_gate_esoteric,
        score_gate: final_score >= cfg.gold_star_threshold,
    };

    // 1. Titanium override, regardless of final_score.
    if titanium_flag {
        return TierDecision { tier: Tier::TitaniumSmash, gates };
    }

    // 2. Gold: score gate plus every per-engine gate.
    if gates.score_gate && gates.all_engine_gates_pass() {
        return TierDecision { tier: Tier::GoldStar, gates };
    }

    // 3. Edge lean: the explicit downgrade path. Gold-eligible-by-score
    //    candidates with a failed gate land here, never dropped.
    let confluence_floor = ConfluenceLevel::from_config(&cfg.edge_confluence_floor);
    if final_score >= cfg.edge_lean_threshold && confluence >= confluence_floor {
        return TierDecision { tier: Tier::EdgeLean, gates };
    }

    // 4-5. Internal-only tiers.
    if final_score >= cfg.monitor_threshold {
        return TierDecision { tier: Tier::Monitor, gates };
    }
    TierDecision { tier: Tier::Pass, gates }
}
