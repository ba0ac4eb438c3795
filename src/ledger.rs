//! Append-only pick ledger.
//!
//! One NDJSON record per published pick, carrying the full scoring snapshot
//! so the tier can be re-derived offline without recomputation. `persist`
//! is idempotent per (pick_id, slate_date): the per-day claimed set and the
//! file append share one lock, so the check-then-write race between
//! concurrent requests cannot produce duplicate records. Records are
//! flushed and synced before the call returns; a failed write surfaces as a
//! per-pick error and leaves nothing claimed.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PipelineError;
use crate::pipeline::ScoredCandidate;
use crate::state::{slate_date, ts_now};

/// `pick_id = hex(sha256(candidate_key ":" slate_date))`, stable across
/// repeated computations of the same opportunity on the same slate.
pub fn pick_id(candidate_key: &str, slate: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(candidate_key.as_bytes());
    hasher.update(b":");
    hasher.update(slate.as_bytes());
    hex::encode(hasher.finalize())
}

/// Immutable snapshot of a candidate at publication. Never mutated after
/// the append; grading attaches results in a separate log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub pick_id: String,
    pub slate_date: String,
    pub published_tier: crate::tier::Tier,
    pub units: f64,
    pub published_at: String,
    pub scored: ScoredCandidate,
}

impl Pick {
    pub fn from_scored(scored: &ScoredCandidate) -> Self {
        let slate = slate_date(scored.candidate.start_time);
        Self {
            pick_id: pick_id(&scored.candidate.candidate_key, &slate),
            slate_date: slate,
            published_tier: scored.tier,
            units: scored.tier.units(),
            published_at: ts_now(),
            scored: scored.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Persisted,
    /// The pick_id already exists for this slate date; the call is a no-op,
    /// not an overwrite.
    Duplicate,
}

struct LedgerInner {
    file: File,
    /// pick_ids already claimed, per slate date.
    claimed: HashMap<String, HashSet<String>>,
}

pub struct PickLedger {
    inner: Mutex<LedgerInner>,
}

impl PickLedger {
    /// Open (creating if absent) and replay existing records to seed the
    /// claimed sets, so idempotence survives restarts.
    pub fn open(path: &str) -> Result<Self, PipelineError> {
        let mut claimed: HashMap<String, HashSet<String>> = HashMap::new();
        for pick in Self::replay(path)? {
            claimed.entry(pick.slate_date).or_default().insert(pick.pick_id);
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { inner: Mutex::new(LedgerInner { file, claimed }) })
    }

    pub fn persist(&self, pick: &Pick) -> Result<PersistOutcome, PipelineError> {
        let mut inner = self.inner.lock().expect("ledger lock poisoned");
        if inner
            .claimed
            .get(&pick.slate_date)
            .map(|day| day.contains(&pick.pick_id))
            .unwrap_or(false)
        {
            return Ok(PersistOutcome::Duplicate);
        }

        let line = serde_json::to_string(pick)?;
        writeln!(inner.file, "{}", line)?;
        inner.file.flush()?;
        inner.file.sync_data()?;

        // Claim only after the record is durable; a failed write leaves the
        // id free for a retry.
        inner
            .claimed
            .entry(pick.slate_date.clone())
            .or_default()
            .insert(pick.pick_id.clone());
        Ok(PersistOutcome::Persisted)
    }

    /// Read every record in append order. Lines that fail to parse are
    /// skipped rather than failing the replay.
    pub fn replay(path: &str) -> Result<Vec<Pick>, PipelineError> {
        if !Path::new(path).exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(path)?;
        let reader = BufReader::new(file);
        let mut picks = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(pick) = serde_json::from_str::<Pick>(&line) {
                picks.push(pick);
            }
        }
        Ok(picks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{Candidate, MarketKind, SideSignals};
    use crate::engines::{EngineScore, EngineScoreSet};
    use crate::pipeline::score_candidate;
    use crate::state::Config;
    use crate::weights::WeightSet;

    fn make_pick(key: &str) -> Pick {
        let cand = Candidate {
            sport: "nfl".to_string(),
            market_kind: MarketKind::Game,
            matchup_or_player: "KC@BUF".to_string(),
            line: -2.5,
            side: "BUF +2.5".to_string(),
            start_time: 1_750_000_000,
            candidate_key: key.to_string(),
            scores: EngineScoreSet {
                ai: EngineScore::active(7.8),
                research: EngineScore::active(7.6),
                esoteric: EngineScore::active(7.4),
                jarvis: EngineScore::active(7.5),
            },
            signals: SideSignals::default(),
        };
        let scored = score_candidate(&cand, &WeightSet::defaults(), &Config::from_env()).unwrap();
        Pick::from_scored(&scored)
    }

    #[test]
    fn pick_id_is_deterministic_and_slate_scoped() {
        assert_eq!(pick_id("k1", "2025-06-15"), pick_id("k1", "2025-06-15"));
        assert_ne!(pick_id("k1", "2025-06-15"), pick_id("k1", "2025-06-16"));
        assert_ne!(pick_id("k1", "2025-06-15"), pick_id("k2", "2025-06-15"));
    }

    #[test]
    fn persist_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("picks.jsonl");
        let path = path.to_str().unwrap();

        let ledger = PickLedger::open(path).unwrap();
        let pick = make_pick("k1");

        assert_eq!(ledger.persist(&pick).unwrap(), PersistOutcome::Persisted);
        assert_eq!(ledger.persist(&pick).unwrap(), PersistOutcome::Duplicate);

        let replayed = PickLedger::replay(path).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].pick_id, pick.pick_id);
    }

    #[test]
    fn idempotence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("picks.jsonl");
        let path = path.to_str().unwrap();

        let pick = make_pick("k1");
        {
            let ledger = PickLedger::open(path).unwrap();
            ledger.persist(&pick).unwrap();
        }
        let reopened = PickLedger::open(path).unwrap();
        assert_eq!(reopened.persist(&pick).unwrap(), PersistOutcome::Duplicate);
        assert_eq!(PickLedger::replay(path).unwrap().len(), 1);
    }

    #[test]
    fn concurrent_writers_produce_one_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("picks.jsonl");
        let path = path.to_str().unwrap().to_string();

        let ledger = std::sync::Arc::new(PickLedger::open(&path).unwrap());
        let pick = make_pick("contested");

        let mut persisted = 0;
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let ledger = ledger.clone();
                    let pick = pick.clone();
                    scope.spawn(move || ledger.persist(&pick).unwrap())
                })
                .collect();
            for h in handles {
                if h.join().unwrap() == PersistOutcome::Persisted {
                    persisted += 1;
                }
            }
        });

        assert_eq!(persisted, 1);
        assert_eq!(PickLedger::replay(&path).unwrap().len(), 1);
    }

    #[test]
    fn replay_preserves_append_order_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("picks.jsonl");
        let path = path.to_str().unwrap();

        let ledger = PickLedger::open(path).unwrap();
        ledger.persist(&make_pick("k1")).unwrap();
        ledger.persist(&make_pick("k2")).unwrap();

        // A torn/corrupt trailing line must not poison the replay.
        {
            use std::io::Write;
            let mut f = OpenOptions::new().append(true).open(path).unwrap();
            writeln!(f, "{{truncated").unwrap();
        }

        let replayed = PickLedger::replay(path).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].scored.candidate.candidate_key, "k1");
        assert_eq!(replayed[1].scored.candidate.candidate_key, "k2");
    }
}
