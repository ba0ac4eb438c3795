//! Structured logging for the scoring pipeline.
//!
//! Design goals:
//! 1. Multi-level granularity (TRACE → FATAL), env-filtered
//! 2. Domain categories matching the pipeline stages, filterable
//! 3. JSONL output per run for replay/audit tooling
//! 4. Decision logs that capture the score breakdown behind each tier

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

// =============================================================================
// Log Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Fatal = 5,
}

impl Level {
    pub fn from_env() -> Self {
        match std::env::var("LOG_LEVEL").as_deref() {
            Ok("trace") => Level::Trace,
            Ok("debug") => Level::Debug,
            Ok("info") => Level::Info,
            Ok("warn") => Level::Warn,
            Ok("error") => Level::Error,
            Ok("fatal") => Level::Fatal,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

// =============================================================================
// Log Domains (categories for filtering)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Score,      // Composition, per-candidate scoring runs
    Modifier,   // Modifier pipeline statuses and caps
    Confluence, // Alignment, special cases, titanium
    Tier,       // Tier decisions and gate reports
    Filter,     // Concentration filter selections
    Ledger,     // Pick persistence
    Grading,    // Outcome grading cycles
    Weights,    // Weight proposals, publishes, rejections
    System,     // Startup, shutdown, config
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Score => "score",
            Domain::Modifier => "modifier",
            Domain::Confluence => "confluence",
            Domain::Tier => "tier",
            Domain::Filter => "filter",
            Domain::Ledger => "ledger",
            Domain::Grading => "grading",
            Domain::Weights => "weights",
            Domain::System => "system",
        }
    }

    pub fn is_enabled(&self) -> bool {
        // LOG_DOMAINS: comma-separated list or "all"
        match std::env::var("LOG_DOMAINS").as_deref() {
            Ok("all") | Err(_) => true,
            Ok(domains) => domains.split(',').any(|d| d.trim() == self.as_str()),
        }
    }
}

// =============================================================================
// Run context
// =============================================================================

static LOG_SEQ: AtomicU64 = AtomicU64::new(0);
static RUN_CONTEXT: OnceLock<RunContext> = OnceLock::new();

fn next_seq() -> u64 {
    LOG_SEQ.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug)]
struct RunContext {
    run_id: String,
    events: Mutex<BufWriter<File>>,
    trace: Mutex<BufWriter<File>>,
}

fn ensure_run_context() -> &'static RunContext {
    RUN_CONTEXT.get_or_init(|| {
        let run_id = std::env::var("RUN_ID")
            .unwrap_or_else(|_| format!("r-{}-{}", ts_epoch_ms(), process::id()));
        let base = std::env::var("LOG_DIR").unwrap_or_else(|_| "out/runs".to_string());
        let mut run_dir = PathBuf::from(base);
        run_dir.push(&run_id);
        if let Err(err) = create_dir_all(&run_dir) {
            eprintln!("[log] failed to create run dir: {}", err);
        }
        let events_path = run_dir.join("events.jsonl");
        let trace_path = run_dir.join("trace.jsonl");

        let events = File::create(events_path).unwrap_or_else(|err| {
            eprintln!("[log] failed to create events log: {}", err);
            File::create("/tmp/pickrank-events.jsonl").expect("events fallback")
        });
        let trace = File::create(trace_path).unwrap_or_else(|err| {
            eprintln!("[log] failed to create trace log: {}", err);
            File::create("/tmp/pickrank-trace.jsonl").expect("trace fallback")
        });

        RunContext {
            run_id,
            events: Mutex::new(BufWriter::new(events)),
            trace: Mutex::new(BufWriter::new(trace)),
        }
    })
}

fn write_line(writer: &Mutex<BufWriter<File>>, line: &str) {
    if let Ok(mut w) = writer.lock() {
        let _ = writeln!(w, "{}", line);
        let _ = w.flush();
    }
}

// =============================================================================
// Core logging functions
// =============================================================================

/// RFC3339 timestamp with milliseconds
pub fn ts_log() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Epoch milliseconds (for replay correlation)
pub fn ts_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

/// Emit a structured log entry
pub fn log(level: Level, domain: Domain, event: &str, fields: Map<String, Value>) {
    let min_level = Level::from_env();
    if level < min_level || !domain.is_enabled() {
        return;
    }

    let ctx = ensure_run_context();
    let mut entry = Map::new();
    entry.insert("ts".to_string(), json!(ts_log()));
    entry.insert("run_id".to_string(), json!(ctx.run_id.clone()));
    entry.insert("seq".to_string(), json!(next_seq()));
    entry.insert("lvl".to_string(), json!(level.as_str().to_uppercase()));
    entry.insert("domain".to_string(), json!(domain.as_str()));
    entry.insert("event".to_string(), json!(event));
    entry.insert("data".to_string(), Value::Object(fields));

    let line = Value::Object(entry).to_string();
    match level {
        Level::Trace | Level::Debug => write_line(&ctx.trace, &line),
        _ => write_line(&ctx.events, &line),
    }
    println!("{}", line);
}

// =============================================================================
// Domain-specific helpers
// =============================================================================

/// One line per tier decision: the breakdown a reader needs to audit it.
pub fn log_tier_decision(
    candidate_key: &str,
    tier: &str,
    final_score: f64,
    base_score: f64,
    boost_total: f64,
    env_factor: f64,
    titanium: bool,
    confluence: &str,
) {
    log(
        Level::Info,
        Domain::Tier,
        "decision",
        obj(&[
            ("candidate_key", v_str(candidate_key)),
            ("tier", v_str(tier)),
            ("final_score", v_num(final_score)),
            ("base_score", v_num(base_score)),
            ("boost_total", v_num(boost_total)),
            ("env_factor", v_num(env_factor)),
            ("titanium", Value::Bool(titanium)),
            ("confluence", v_str(confluence)),
        ]),
    );
}

pub fn log_pick_persisted(pick_id: &str, slate_date: &str, tier: &str, duplicate: bool) {
    log(
        Level::Info,
        Domain::Ledger,
        "pick_persisted",
        obj(&[
            ("pick_id", v_str(pick_id)),
            ("slate_date", v_str(slate_date)),
            ("tier", v_str(tier)),
            ("duplicate", Value::Bool(duplicate)),
        ]),
    );
}

pub fn log_grading_cycle(graded_now: usize, pending: usize, total_graded: usize) {
    log(
        Level::Info,
        Domain::Grading,
        "cycle",
        obj(&[
            ("graded_now", json!(graded_now)),
            ("pending", json!(pending)),
            ("total_graded", json!(total_graded)),
        ]),
    );
}

pub fn log_weights_published(version: u64, ai: f64, research: f64, esoteric: f64, jarvis: f64) {
    log(
        Level::Info,
        Domain::Weights,
        "published",
        obj(&[
            ("version", json!(version)),
            ("ai", v_num(ai)),
            ("research", v_num(research)),
            ("esoteric", v_num(esoteric)),
            ("jarvis", v_num(jarvis)),
        ]),
    );
}

/// Rejected update or corrupt store: loud, with the prior version retained.
pub fn alert(domain: Domain, event: &str, msg: &str) {
    log(
        Level::Error,
        domain,
        event,
        obj(&[("msg", v_str(msg))]),
    );
}

// =============================================================================
// Utility functions
// =============================================================================

pub fn obj(pairs: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (k, v) in pairs {
        map.insert((*k).to_string(), v.clone());
    }
    map
}

pub fn v_str(s: &str) -> Value {
    Value::String(s.to_string())
}

pub fn v_num(n: f64) -> Value {
    json!(n)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_obj_helper() {
        let m = obj(&[("key", v_str("value")), ("num", v_num(42.0))]);
        assert_eq!(m.get("key").unwrap(), "value");
        assert_eq!(m.get("num").unwrap(), 42.0);
    }

    #[test]
    fn test_seq_increments() {
        let s1 = next_seq();
        let s2 = next_seq();
        assert!(s2 > s1);
    }
}
