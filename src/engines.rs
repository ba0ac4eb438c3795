//! Engine score contract: the four independent scoring subsystems.
//!
//! Each engine produces a 0-10 score with an `active` flag and a list of
//! structured reasons. Engines never read each other's raw signals: a given
//! upstream fact (sharp money, lineup news, an ephemeris aspect) feeds
//! exactly one engine, so the weighted sum never double-counts.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    Ai,
    Research,
    Esoteric,
    Jarvis,
}

impl Engine {
    pub const ALL: [Engine; 4] = [Engine::Ai, Engine::Research, Engine::Esoteric, Engine::Jarvis];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Ai => "ai",
            Engine::Research => "research",
            Engine::Esoteric => "esoteric",
            Engine::Jarvis => "jarvis",
        }
    }
}

/// Structured (code, text) pair so audit and tests match on codes,
/// never on prose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reason {
    pub code: String,
    pub text: String,
}

impl Reason {
    pub fn new(code: &str, text: impl Into<String>) -> Self {
        Self { code: code.to_string(), text: text.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineScore {
    pub value: f64,
    pub active: bool,
    #[serde(default)]
    pub reasons: Vec<Reason>,
}

impl EngineScore {
    pub fn active(value: f64) -> Self {
        Self { value, active: true, reasons: Vec::new() }
    }

    /// No signal from this engine. Its contribution is the configured
    /// baseline, decided at composition time.
    pub fn inactive() -> Self {
        Self { value: 0.0, active: false, reasons: Vec::new() }
    }

    pub fn with_reason(mut self, code: &str, text: impl Into<String>) -> Self {
        self.reasons.push(Reason::new(code, text));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineScoreSet {
    pub ai: EngineScore,
    pub research: EngineScore,
    pub esoteric: EngineScore,
    pub jarvis: EngineScore,
}

impl EngineScoreSet {
    pub fn get(&self, engine: Engine) -> &EngineScore {
        match engine {
            Engine::Ai => &self.ai,
            Engine::Research => &self.research,
            Engine::Esoteric => &self.esoteric,
            Engine::Jarvis => &self.jarvis,
        }
    }

    pub fn get_mut(&mut self, engine: Engine) -> &mut EngineScore {
        match engine {
            Engine::Ai => &mut self.ai,
            Engine::Research => &mut self.research,
            Engine::Esoteric => &mut self.esoteric,
            Engine::Jarvis => &mut self.jarvis,
        }
    }

    /// Value entering the weighted sum. Inactive engines contribute the
    /// baseline rather than being dropped: dropping one would implicitly
    /// re-normalize the other weights and break comparability across
    /// candidates.
    pub fn effective(&self, engine: Engine, baseline: f64) -> f64 {
        let s = self.get(engine);
        if s.active {
            s.value
        } else {
            baseline
        }
    }

    /// Count of active engines at or above the titanium threshold.
    /// The threshold is inclusive: exactly 8.0 counts.
    pub fn titanium_hits(&self, threshold: f64) -> usize {
        Engine::ALL
            .iter()
            .filter(|e| {
                let s = self.get(**e);
                s.active && s.value >= threshold
            })
            .count()
    }

    /// Reject NaN and out-of-range values on active scores. Inactive scores
    /// are not range-checked (their value is ignored at composition).
    pub fn validate(&self, candidate_key: &str) -> Result<(), PipelineError> {
        for engine in Engine::ALL {
            let s = self.get(engine);
            if !s.active {
                continue;
            }
            if s.value.is_nan() {
                return Err(PipelineError::InvalidInput {
                    candidate_key: candidate_key.to_string(),
                    reason: format!("{} score is NaN", engine.as_str()),
                });
            }
            if !(0.0..=10.0).contains(&s.value) {
                return Err(PipelineError::InvalidInput {
                    candidate_key: candidate_key.to_string(),
                    reason: format!("{} score {} outside [0,10]", engine.as_str(), s.value),
                });
            }
        }
        Ok(())
    }

    /// Ordered human-readable reasons across all engines, for explanations.
    pub fn all_reasons(&self) -> Vec<Reason> {
        let mut out = Vec::new();
        for engine in Engine::ALL {
            out.extend(self.get(engine).reasons.iter().cloned());
        }
        out
    }
}
