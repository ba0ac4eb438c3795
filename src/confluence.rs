//! Confluence: degree of agreement between the Research and Esoteric
//! engines, plus the titanium override.
//!
//! Special-case levels are evaluated before the generic alignment ladder;
//! the first match wins and short-circuits the rest. The chosen level's
//! boost enters the modifier pipeline exactly once; there is no separate
//! generic alignment boost to double-count against.

use serde::{Deserialize, Serialize};

use crate::candidate::SideSignals;
use crate::engines::{Engine, EngineScoreSet, Reason};
use crate::state::Config;

/// Ordered worst → best. Declaration order drives `Ord`, which the
/// EDGE_LEAN confluence floor compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfluenceLevel {
    Divergent,
    Moderate,
    Strong,
    Perfect,
    JarvisPerfect,
    Immortal,
    HarmonicConvergence,
}

impl ConfluenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfluenceLevel::Divergent => "divergent",
            ConfluenceLevel::Moderate => "moderate",
            ConfluenceLevel::Strong => "strong",
            ConfluenceLevel::Perfect => "perfect",
            ConfluenceLevel::JarvisPerfect => "jarvis_perfect",
            ConfluenceLevel::Immortal => "immortal",
            ConfluenceLevel::HarmonicConvergence => "harmonic_convergence",
        }
    }

    /// Post-base boost for the level, before pillar scaling and caps.
    pub fn boost(&self) -> f64 {
        match self {
            ConfluenceLevel::Divergent => 0.0,
            ConfluenceLevel::Moderate => 0.25,
            ConfluenceLevel::Strong => 0.5,
            ConfluenceLevel::Perfect => 0.75,
            ConfluenceLevel::JarvisPerfect => 0.9,
            ConfluenceLevel::Immortal => 1.0,
            ConfluenceLevel::HarmonicConvergence => 1.2,
        }
    }

    /// Parse a config floor value; unknown strings disable the floor.
    pub fn from_config(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "moderate" => ConfluenceLevel::Moderate,
            "strong" => ConfluenceLevel::Strong,
            "perfect" => ConfluenceLevel::Perfect,
            "jarvis_perfect" => ConfluenceLevel::JarvisPerfect,
            "immortal" => ConfluenceLevel::Immortal,
            "harmonic_convergence" => ConfluenceLevel::HarmonicConvergence,
            _ => ConfluenceLevel::Divergent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfluenceOutcome {
    pub level: ConfluenceLevel,
    pub alignment: f64,
    pub reasons: Vec<Reason>,
}

#[derive(Debug, Clone, Copy)]
pub struct TitaniumOutcome {
    pub flag: bool,
    pub hits: usize,
}

/// `alignment = 1 − |research − esoteric| / 10`, clamped to [0,1].
/// Inactive engines enter at the configured baseline.
pub fn alignment(scores: &EngineScoreSet, baseline: f64) -> f64 {
    let research = scores.effective(Engine::Research, baseline);
    let esoteric = scores.effective(Engine::Esoteric, baseline);
    (1.0 - (research - esoteric).abs() / 10.0).clamp(0.0, 1.0)
}

pub fn evaluate(scores: &EngineScoreSet, signals: &SideSignals, cfg: &Config) -> ConfluenceOutcome {
    let align = alignment(scores, cfg.engine_baseline);
    let research = scores.get(Engine::Research);
    let esoteric = scores.get(Engine::Esoteric);
    let jarvis = scores.get(Engine::Jarvis);

    // Special cases first; first match wins.
    if research.active
        && esoteric.active
        && research.value >= cfg.special_engine_floor
        && esoteric.value >= cfg.special_engine_floor
    {
        if let Some(trigger) = &signals.named_trigger {
            return ConfluenceOutcome {
                level: ConfluenceLevel::Immortal,
                alignment: align,
                reasons: vec![Reason::new(
                    "confluence.immortal",
                    format!(
                        "research {:.1} and esoteric {:.1} both elite with trigger {}",
                        research.value, esoteric.value, trigger
                    ),
                )],
            };
        }
    }

    if jarvis.active && jarvis.value >= cfg.special_engine_floor && align >= cfg.strong_alignment {
        return ConfluenceOutcome {
            level: ConfluenceLevel::JarvisPerfect,
            alignment: align,
            reasons: vec![Reason::new(
                "confluence.jarvis_perfect",
                format!("jarvis {:.1} elite with alignment {:.2}", jarvis.value, align),
            )],
        };
    }

    if let Some(outcome) = harmonic_convergence(scores, align, cfg) {
        return outcome;
    }

    // Generic alignment ladder.
    let level = if align >= cfg.perfect_alignment
        && research.active
        && esoteric.active
        && research.value >= cfg.perfect_engine_floor
        && esoteric.value >= cfg.perfect_engine_floor
        && signals.has_other_active_signal()
    {
        ConfluenceLevel::Perfect
    } else if align >= cfg.strong_alignment {
        ConfluenceLevel::Strong
    } else if align >= cfg.moderate_alignment {
        ConfluenceLevel::Moderate
    } else {
        ConfluenceLevel::Divergent
    };

    ConfluenceOutcome {
        level,
        alignment: align,
        reasons: vec![Reason::new(
            "confluence.level",
            format!("{} at alignment {:.2}", level.as_str(), align),
        )],
    }
}

// All four engines active, inside one tight band, with a high mean.
fn harmonic_convergence(
    scores: &EngineScoreSet,
    align: f64,
    cfg: &Config,
) -> Option<ConfluenceOutcome> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for engine in Engine::ALL {
        let s = scores.get(engine);
        if !s.active {
            return None;
        }
        min = min.min(s.value);
        max = max.max(s.value);
        sum += s.value;
    }
    let mean = sum / Engine::ALL.len() as f64;
    if max - min <= cfg.harmonic_band && mean >= cfg.harmonic_mean_floor {
        Some(ConfluenceOutcome {
            level: ConfluenceLevel::HarmonicConvergence,
            alignment: align,
            reasons: vec![Reason::new(
                "confluence.harmonic",
                format!("all engines within {:.1} band, mean {:.2}", cfg.harmonic_band, mean),
            )],
        })
    } else {
        None
    }
}

/// Titanium is independent of the composed score: enough engines clearing a
/// high bar forces the top tier before the generic ladder ever runs.
pub fn titanium(scores: &EngineScoreSet, cfg: &Config) -> TitaniumOutcome {
    let hits = scores.titanium_hits(cfg.titanium_threshold);
    TitaniumOutcome { flag: hits >= cfg.titanium_min_hits, hits }
}
