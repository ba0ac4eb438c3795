// Pipeline configuration + clock/slate helpers.
//
// Every threshold, cap, gate, and path is an env-overridable knob with a
// default. Numeric constants here are configuration, not invariants: the
// structural rules (engine separation, tier ordering, cap-before-sum) live
// in code.

#[derive(Clone)]
pub struct Config {
    // Engine composition
    pub engine_baseline: f64,
    pub titanium_threshold: f64,
    pub titanium_min_hits: usize,

    // Tier thresholds and gold gates
    pub gold_star_threshold: f64,
    pub gold_gate_ai: f64,
    pub gold_gate_research: f64,
    pub gold_gate_jarvis: f64,
    pub gold_gate_esoteric: f64,
    pub edge_lean_threshold: f64,
    /// Minimum confluence level for EDGE_LEAN ("divergent" disables the floor).
    pub edge_confluence_floor: String,
    pub monitor_threshold: f64,

    // Modifier caps (individual caps apply before the shared sum cap)
    pub total_boost_cap: f64,
    pub lineup_shrink_max: f64,
    pub line_shift_cap: f64,
    pub simulation_cap: f64,
    pub simulation_prob_threshold: f64,
    pub consensus_cap: f64,
    pub consensus_threshold: f64,
    pub sharp_cap: f64,
    pub correlation_cap: f64,
    pub hook_penalty_cap: f64,

    // Environmental severity (multiplicative, bounded below)
    pub kp_watch: f64,
    pub kp_severe: f64,
    pub kp_watch_factor: f64,
    pub kp_severe_factor: f64,
    pub weather_severe_threshold: f64,
    pub weather_severe_factor: f64,
    pub env_factor_floor: f64,

    // Confluence ladder
    pub strong_alignment: f64,
    pub moderate_alignment: f64,
    pub perfect_alignment: f64,
    pub perfect_engine_floor: f64,
    pub special_engine_floor: f64,
    pub harmonic_band: f64,
    pub harmonic_mean_floor: f64,

    // Concentration filter
    pub game_score_floor: f64,
    pub prop_score_floor: f64,
    pub max_picks_per_matchup: usize,
    pub max_picks_per_sport: usize,

    // Persistence
    pub ledger_path: String,
    pub grading_path: String,
    pub weights_path: String,
    pub weights_history_path: String,
    pub sqlite_path: String,
    pub slate_path: String,
    pub outcomes_path: String,

    // Grading / learning loop
    pub grade_interval_secs: u64,
    pub grade_delay_secs: u64,
    pub min_graded_for_update: usize,
    pub max_weight_delta: f64,
    pub weight_floor: f64,
    pub weight_ceiling: f64,
    pub learning_rate: f64,
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            engine_baseline: env_f64("ENGINE_BASELINE", 5.0),
            titanium_threshold: env_f64("TITANIUM_TH", 8.0),
            titanium_min_hits: env_usize("TITANIUM_MIN_HITS", 3),
            gold_star_threshold: env_f64("GOLD_STAR_TH", 8.5),
            gold_gate_ai: env_f64("GOLD_GATE_AI", 7.0),
            gold_gate_research: env_f64("GOLD_GATE_RESEARCH", 7.0),
            gold_gate_jarvis: env_f64("GOLD_GATE_JARVIS", 6.5),
            gold_gate_esoteric: env_f64("GOLD_GATE_ESOTERIC", 6.0),
            edge_lean_threshold: env_f64("EDGE_LEAN_TH", 7.0),
            edge_confluence_floor: env_str("EDGE_CONFLUENCE_FLOOR", "moderate"),
            monitor_threshold: env_f64("MONITOR_TH", 5.5),
            total_boost_cap: env_f64("TOTAL_BOOST_CAP", 1.5),
            lineup_shrink_max: env_f64("LINEUP_SHRINK_MAX", 0.2),
            line_shift_cap: env_f64("LINE_SHIFT_CAP", 0.5),
            simulation_cap: env_f64("SIM_CAP", 0.5),
            simulation_prob_threshold: env_f64("SIM_PROB_TH", 0.60),
            consensus_cap: env_f64("CONSENSUS_CAP", 0.4),
            consensus_threshold: env_f64("CONSENSUS_TH", 0.70),
            sharp_cap: env_f64("SHARP_CAP", 0.5),
            correlation_cap: env_f64("CORRELATION_CAP", 0.4),
            hook_penalty_cap: env_f64("HOOK_PENALTY_CAP", 0.3),
            kp_watch: env_f64("KP_WATCH", 5.0),
            kp_severe: env_f64("KP_SEVERE", 7.0),
            kp_watch_factor: env_f64("KP_WATCH_FACTOR", 0.95),
            kp_severe_factor: env_f64("KP_SEVERE_FACTOR", 0.90),
            weather_severe_threshold: env_f64("WEATHER_SEVERE_TH", 0.8),
            weather_severe_factor: env_f64("WEATHER_SEVERE_FACTOR", 0.95),
            env_factor_floor: env_f64("ENV_FACTOR_FLOOR", 0.85),
            strong_alignment: env_f64("STRONG_ALIGNMENT", 0.8),
            moderate_alignment: env_f64("MODERATE_ALIGNMENT", 0.6),
            perfect_alignment: env_f64("PERFECT_ALIGNMENT", 0.9),
            perfect_engine_floor: env_f64("PERFECT_ENGINE_FLOOR", 7.5),
            special_engine_floor: env_f64("SPECIAL_ENGINE_FLOOR", 9.5),
            harmonic_band: env_f64("HARMONIC_BAND", 0.5),
            harmonic_mean_floor: env_f64("HARMONIC_MEAN_FLOOR", 7.5),
            game_score_floor: env_f64("GAME_FLOOR", 6.75),
            prop_score_floor: env_f64("PROP_FLOOR", 6.5),
            max_picks_per_matchup: env_usize("MAX_PER_MATCHUP", 3),
            max_picks_per_sport: env_usize("MAX_PER_SPORT", 8),
            ledger_path: env_str("LEDGER_PATH", "./picks.jsonl"),
            grading_path: env_str("GRADING_PATH", "./gradings.jsonl"),
            weights_path: env_str("WEIGHTS_PATH", "./weights.json"),
            weights_history_path: env_str("WEIGHTS_HISTORY_PATH", "./weights_history.jsonl"),
            sqlite_path: env_str("SQLITE_PATH", "./stats.sqlite"),
            slate_path: env_str("SLATE_PATH", "./slate.json"),
            outcomes_path: env_str("OUTCOMES_PATH", "./outcomes.jsonl"),
            grade_interval_secs: env_u64("GRADE_INTERVAL_SECS", 3600),
            grade_delay_secs: env_u64("GRADE_DELAY_SECS", 14400),
            min_graded_for_update: env_usize("MIN_GRADED_FOR_UPDATE", 25),
            max_weight_delta: env_f64("MAX_WEIGHT_DELTA", 0.05),
            weight_floor: env_f64("WEIGHT_FLOOR", 0.10),
            weight_ceiling: env_f64("WEIGHT_CEILING", 0.50),
            learning_rate: env_f64("LEARNING_RATE", 0.10),
        }
    }
}

pub fn now_ts() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

/// RFC3339 timestamp with milliseconds, for ledger records and logs.
pub fn ts_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Slate date (UTC day) for an epoch-seconds timestamp.
pub fn slate_date(ts: u64) -> String {
    use chrono::TimeZone;
    match chrono::Utc.timestamp_opt(ts as i64, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d").to_string(),
        _ => "1970-01-01".to_string(),
    }
}
