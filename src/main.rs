use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{sleep, Duration};

use pickrank::candidate::Candidate;
use pickrank::error::PipelineError;
use pickrank::grading::{GradingEngine, GradingLog, Outcome, OutcomeSource};
use pickrank::ledger::{Pick, PickLedger, PersistOutcome};
use pickrank::logging::{self, Domain};
use pickrank::pipeline;
use pickrank::state::Config;
use pickrank::storage::StatsStore;
use pickrank::weights::WeightStore;

/// File-backed outcome collaborator: one JSON object per line, keyed by
/// pick_id (or candidate_key + slate_date). Stands in for the live results
/// feed in offline runs.
struct FileOutcomes {
    by_pick_id: HashMap<String, Outcome>,
}

#[derive(Deserialize)]
struct OutcomeLine {
    #[serde(default)]
    pick_id: Option<String>,
    #[serde(default)]
    candidate_key: Option<String>,
    #[serde(default)]
    slate_date: Option<String>,
    outcome: Outcome,
}

impl FileOutcomes {
    fn load(path: &str) -> Result<Self> {
        let mut by_pick_id = HashMap::new();
        if Path::new(path).exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading outcomes from {}", path))?;
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let parsed: OutcomeLine = match serde_json::from_str(line) {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                let id = match (parsed.pick_id, parsed.candidate_key, parsed.slate_date) {
                    (Some(id), _, _) => id,
                    (None, Some(key), Some(slate)) => pickrank::ledger::pick_id(&key, &slate),
                    _ => continue,
                };
                by_pick_id.insert(id, parsed.outcome);
            }
        }
        Ok(Self { by_pick_id })
    }
}

#[async_trait]
impl OutcomeSource for FileOutcomes {
    async fn resolve(&self, pick: &Pick) -> Option<Outcome> {
        self.by_pick_id.get(&pick.pick_id).copied()
    }
}

fn open_weight_store(cfg: &Config) -> Result<WeightStore> {
    match WeightStore::open(cfg.clone()) {
        Ok(store) => Ok(store),
        // Serve last known-good defaults rather than a corrupt snapshot.
        Err(PipelineError::WeightStoreCorrupt { path, reason }) => {
            logging::alert(
                Domain::Weights,
                "store_corrupt",
                &format!("{}: {}, serving defaults", path, reason),
            );
            Ok(WeightStore::in_memory(cfg.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

fn score_and_persist(cfg: &Config, store: &WeightStore, ledger: &PickLedger) -> Result<()> {
    let raw = std::fs::read_to_string(&cfg.slate_path)
        .with_context(|| format!("reading slate from {}", cfg.slate_path))?;
    let candidates: Vec<Candidate> =
        serde_json::from_str(&raw).context("parsing slate candidates")?;

    let weights = store.current();
    let outcome = pipeline::run_slate(&candidates, weights, cfg);

    for skipped in &outcome.skipped {
        logging::log(
            logging::Level::Warn,
            Domain::Score,
            "candidate_skipped",
            logging::obj(&[
                ("candidate_key", logging::v_str(&skipped.candidate_key)),
                ("reason", logging::v_str(&skipped.reason)),
            ]),
        );
    }

    for scored in &outcome.published {
        logging::log_tier_decision(
            &scored.candidate.candidate_key,
            scored.tier.as_str(),
            scored.final_score,
            scored.base_score,
            scored.post_base_total,
            scored.environmental_factor,
            scored.titanium_flag,
            scored.confluence_level.as_str(),
        );

        let pick = Pick::from_scored(scored);
        // Persistence failures are per-pick: the scored result still goes
        // to the caller below.
        match ledger.persist(&pick) {
            Ok(result) => logging::log_pick_persisted(
                &pick.pick_id,
                &pick.slate_date,
                pick.published_tier.as_str(),
                result == PersistOutcome::Duplicate,
            ),
            Err(e) => logging::alert(
                Domain::Ledger,
                "persist_failed",
                &format!("{}: {}", pick.pick_id, e),
            ),
        }
    }

    // The request output: published picks plus the skip summary.
    println!("{}", serde_json::to_string(&outcome)?);
    Ok(())
}

async fn grading_cycle(cfg: &Config, store: &WeightStore) -> Result<()> {
    let source = FileOutcomes::load(&cfg.outcomes_path)?;
    let engine = GradingEngine::new(cfg.clone(), source);
    let log = GradingLog::open(&cfg.grading_path)?;
    let mut stats_store = StatsStore::new(&cfg.sqlite_path)?;
    stats_store.init()?;

    let report = engine.run_grading_cycle(&log, store, Some(&stats_store)).await?;
    logging::log_grading_cycle(report.graded_now, report.pending, report.total_graded);
    if let Some(version) = report.published_version {
        let w = store.current().engine_weights;
        logging::log_weights_published(version, w.ai, w.research, w.esoteric, w.jarvis);
    }
    if let Some(reason) = &report.rejected_update {
        logging::alert(Domain::Weights, "update_rejected", reason);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    logging::log(
        logging::Level::Info,
        Domain::System,
        "startup",
        logging::obj(&[
            ("ledger_path", logging::v_str(&cfg.ledger_path)),
            ("weights_path", logging::v_str(&cfg.weights_path)),
        ]),
    );

    let store = open_weight_store(&cfg)?;
    let ledger = PickLedger::open(&cfg.ledger_path)?;

    if Path::new(&cfg.slate_path).exists() {
        score_and_persist(&cfg, &store, &ledger)?;
    }

    let grade_now = std::env::var("GRADE_NOW").map(|v| v == "1").unwrap_or(false);
    let grade_loop = std::env::var("GRADE_LOOP").map(|v| v == "1").unwrap_or(false);

    if grade_now {
        grading_cycle(&cfg, &store).await?;
    }
    while grade_loop {
        sleep(Duration::from_secs(cfg.grade_interval_secs)).await;
        if let Err(e) = grading_cycle(&cfg, &store).await {
            logging::alert(Domain::Grading, "cycle_failed", &e.to_string());
        }
    }

    Ok(())
}
