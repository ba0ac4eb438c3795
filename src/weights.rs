//! Versioned engine/pillar weights with atomic publish.
//!
//! A `WeightSet` is an immutable value. The store holds the current version
//! behind an `RwLock<Arc<..>>`: readers clone the Arc and keep scoring
//! against a self-consistent snapshot; the learning loop replaces the whole
//! value or nothing. History is retained in memory and in an append-only
//! JSONL file for rollback.
//!
//! The learning loop may tune magnitudes here. It must never alter engine
//! separation (what signal feeds which engine) or tier thresholds; those are
//! structural constants, not learned parameters.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::engines::Engine;
use crate::error::PipelineError;
use crate::state::{ts_now, Config};

const WEIGHT_SUM_TOL: f64 = 1e-6;
const DELTA_TOL: f64 = 1e-9;

/// Per-engine weights. Always sum to 1.0: enforced at publish, never
/// re-checked by the composer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EngineWeights {
    pub ai: f64,
    pub research: f64,
    pub esoteric: f64,
    pub jarvis: f64,
}

impl Default for EngineWeights {
    fn default() -> Self {
        Self { ai: 0.30, research: 0.30, esoteric: 0.20, jarvis: 0.20 }
    }
}

impl EngineWeights {
    pub fn get(&self, engine: Engine) -> f64 {
        match engine {
            Engine::Ai => self.ai,
            Engine::Research => self.research,
            Engine::Esoteric => self.esoteric,
            Engine::Jarvis => self.jarvis,
        }
    }

    pub fn set(&mut self, engine: Engine, value: f64) {
        match engine {
            Engine::Ai => self.ai = value,
            Engine::Research => self.research = value,
            Engine::Esoteric => self.esoteric = value,
            Engine::Jarvis => self.jarvis = value,
        }
    }

    pub fn sum(&self) -> f64 {
        self.ai + self.research + self.esoteric + self.jarvis
    }
}

/// Learning-rate state carried across grading cycles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LearningRate {
    pub rate: f64,
    pub decay: f64,
    pub cycles_applied: u64,
}

impl Default for LearningRate {
    fn default() -> Self {
        Self { rate: 0.10, decay: 0.98, cycles_applied: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSet {
    /// Monotonically increasing; assigned by the store at publish.
    pub version: u64,
    pub engine_weights: EngineWeights,
    /// Per-family scaling of post-base boosts, bounded [0.5, 1.5].
    pub pillar_adjustments: HashMap<String, f64>,
    pub learning_rate: LearningRate,
    pub published_at: String,
}

pub const PILLAR_CONFLUENCE: &str = "confluence";
pub const PILLAR_MARKET: &str = "market";
pub const PILLAR_ENVIRONMENT: &str = "environment";

pub const PILLAR_FLOOR: f64 = 0.5;
pub const PILLAR_CEILING: f64 = 1.5;

impl WeightSet {
    pub fn defaults() -> Self {
        let mut pillars = HashMap::new();
        pillars.insert(PILLAR_CONFLUENCE.to_string(), 1.0);
        pillars.insert(PILLAR_MARKET.to_string(), 1.0);
        pillars.insert(PILLAR_ENVIRONMENT.to_string(), 1.0);
        Self {
            version: 1,
            engine_weights: EngineWeights::default(),
            pillar_adjustments: pillars,
            learning_rate: LearningRate::default(),
            published_at: ts_now(),
        }
    }

    pub fn pillar(&self, name: &str) -> f64 {
        self.pillar_adjustments.get(name).copied().unwrap_or(1.0)
    }
}

fn validate_set(ws: &WeightSet, cfg: &Config) -> Result<(), PipelineError> {
    let w = &ws.engine_weights;
    for engine in Engine::ALL {
        let v = w.get(engine);
        if v.is_nan() {
            return Err(PipelineError::ConfigInvariant(format!(
                "{} weight is NaN",
                engine.as_str()
            )));
        }
        if v < cfg.weight_floor - DELTA_TOL || v > cfg.weight_ceiling + DELTA_TOL {
            return Err(PipelineError::ConfigInvariant(format!(
                "{} weight {:.4} outside [{:.2}, {:.2}]",
                engine.as_str(),
                v,
                cfg.weight_floor,
                cfg.weight_ceiling
            )));
        }
    }
    if (w.sum() - 1.0).abs() > WEIGHT_SUM_TOL {
        return Err(PipelineError::ConfigInvariant(format!(
            "engine weights sum to {:.6}, expected 1.0",
            w.sum()
        )));
    }
    for (name, v) in &ws.pillar_adjustments {
        if !(PILLAR_FLOOR..=PILLAR_CEILING).contains(v) {
            return Err(PipelineError::ConfigInvariant(format!(
                "pillar {} adjustment {:.4} outside [{:.2}, {:.2}]",
                name, v, PILLAR_FLOOR, PILLAR_CEILING
            )));
        }
    }
    Ok(())
}

fn validate_transition(prev: &WeightSet, next: &WeightSet, cfg: &Config) -> Result<(), PipelineError> {
    for engine in Engine::ALL {
        let delta = (next.engine_weights.get(engine) - prev.engine_weights.get(engine)).abs();
        if delta > cfg.max_weight_delta + DELTA_TOL {
            return Err(PipelineError::ConfigInvariant(format!(
                "{} weight delta {:.4} exceeds per-update bound {:.4}",
                engine.as_str(),
                delta,
                cfg.max_weight_delta
            )));
        }
    }
    Ok(())
}

pub struct WeightStore {
    current: RwLock<Arc<WeightSet>>,
    history: Mutex<Vec<Arc<WeightSet>>>,
    cfg: Config,
}

impl WeightStore {
    /// Start from defaults without touching disk (tests, ephemeral runs).
    pub fn in_memory(cfg: Config) -> Self {
        let initial = Arc::new(WeightSet::defaults());
        Self {
            current: RwLock::new(initial.clone()),
            history: Mutex::new(vec![initial]),
            cfg,
        }
    }

    /// Load the snapshot at `cfg.weights_path`, falling back to defaults
    /// when the file is absent. A present-but-unreadable snapshot is
    /// surfaced as `WeightStoreCorrupt`; the caller decides whether to
    /// serve defaults (and alert) or abort.
    pub fn open(cfg: Config) -> Result<Self, PipelineError> {
        let path = cfg.weights_path.clone();
        if !Path::new(&path).exists() {
            let store = Self::in_memory(cfg);
            store.persist_snapshot()?;
            return Ok(store);
        }
        let raw = std::fs::read_to_string(&path)?;
        let ws: WeightSet = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::WeightStoreCorrupt { path: path.clone(), reason: e.to_string() }
        })?;
        validate_set(&ws, &cfg)
            .map_err(|e| PipelineError::WeightStoreCorrupt { path, reason: e.to_string() })?;
        let initial = Arc::new(ws);
        Ok(Self {
            current: RwLock::new(initial.clone()),
            history: Mutex::new(vec![initial]),
            cfg,
        })
    }

    /// Snapshot read. Never blocks on a publish in progress beyond the
    /// pointer swap itself.
    pub fn current(&self) -> Arc<WeightSet> {
        self.current.read().expect("weight store lock poisoned").clone()
    }

    pub fn current_version(&self) -> u64 {
        self.current().version
    }

    /// Validate and atomically publish a proposed set. The store assigns
    /// the next version and timestamp. A rejected proposal leaves the
    /// prior version current; a failed disk write refuses the publish.
    pub fn publish(&self, mut proposed: WeightSet) -> Result<Arc<WeightSet>, PipelineError> {
        let prev = self.current();
        proposed.version = prev.version + 1;
        proposed.published_at = ts_now();

        validate_set(&proposed, &self.cfg)?;
        validate_transition(&prev, &proposed, &self.cfg)?;

        let next = Arc::new(proposed);
        self.persist(&next)?;

        *self.current.write().expect("weight store lock poisoned") = next.clone();
        self.history.lock().expect("weight history lock poisoned").push(next.clone());
        Ok(next)
    }

    /// Republish a prior version as the new current. Skips the bounded-delta
    /// check (the target was already validated when first published) but
    /// still range-validates.
    pub fn rollback_to(&self, version: u64) -> Result<Arc<WeightSet>, PipelineError> {
        let target = {
            let history = self.history.lock().expect("weight history lock poisoned");
            history.iter().find(|w| w.version == version).cloned()
        };
        let target = target.ok_or_else(|| {
            PipelineError::ConfigInvariant(format!("no version {} in weight history", version))
        })?;

        let prev = self.current();
        let mut restored = (*target).clone();
        restored.version = prev.version + 1;
        restored.published_at = ts_now();
        validate_set(&restored, &self.cfg)?;

        let next = Arc::new(restored);
        self.persist(&next)?;
        *self.current.write().expect("weight store lock poisoned") = next.clone();
        self.history.lock().expect("weight history lock poisoned").push(next.clone());
        Ok(next)
    }

    pub fn history_versions(&self) -> Vec<u64> {
        self.history
            .lock()
            .expect("weight history lock poisoned")
            .iter()
            .map(|w| w.version)
            .collect()
    }

    fn persist(&self, ws: &WeightSet) -> Result<(), PipelineError> {
        self.persist_snapshot_of(ws)?;
        self.append_history(ws)?;
        Ok(())
    }

    fn persist_snapshot(&self) -> Result<(), PipelineError> {
        let cur = self.current();
        self.persist_snapshot_of(&cur)
    }

    // Write-to-temp then rename: a reader or a crashed writer never
    // observes a half-written snapshot.
    fn persist_snapshot_of(&self, ws: &WeightSet) -> Result<(), PipelineError> {
        let path = &self.cfg.weights_path;
        let tmp = format!("{}.tmp", path);
        let body = serde_json::to_string_pretty(ws)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn append_history(&self, ws: &WeightSet) -> Result<(), PipelineError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.cfg.weights_history_path)?;
        let line = serde_json::to_string(ws)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}
