// Candidate betting opportunity + already-resolved side signals.
//
// Side signals arrive pre-fetched from collaborators. Each carries a has_*
// flag; a modifier that reads a missing signal reports Unavailable and
// contributes zero, so score history stays reproducible.

use serde::{Deserialize, Serialize};

use crate::engines::EngineScoreSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Game,
    Prop,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::Game => "game",
            MarketKind::Prop => "prop",
        }
    }
}

/// Side-signal values feeding modifiers. Fields are meaningful only when the
/// matching has_* flag is set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SideSignals {
    /// Percent of sharp money on our side (0-100).
    pub sharp_pct: f64,
    /// Percent of public tickets on our side (0-100).
    pub public_pct: f64,
    /// Points the line has moved toward our side since open.
    pub line_move: f64,
    /// Confirmed-lineup confidence (0-1).
    pub lineup_confidence: f64,
    /// Simulation win probability (0-1).
    pub sim_win_prob: f64,
    /// Expert consensus agreeing with our side (0-1).
    pub consensus_pct: f64,
    /// Count of already-selected same-slate picks correlated with this one.
    pub correlated_picks: u32,
    /// Distance of the line from the nearest key number, in points.
    pub hook_distance: f64,
    /// Geomagnetic planetary K index.
    pub kp_index: f64,
    /// Weather severity for outdoor events (0-1).
    pub weather_severity: f64,
    /// Named special-case trigger supplied by the esoteric subsystem.
    #[serde(default)]
    pub named_trigger: Option<String>,

    pub has_sharp: bool,
    pub has_line_move: bool,
    pub has_lineup: bool,
    pub has_simulation: bool,
    pub has_consensus: bool,
    pub has_correlation: bool,
    pub has_hook: bool,
    pub has_kp: bool,
    pub has_weather: bool,
}

impl SideSignals {
    /// "At least one other active signal" condition used by the confluence
    /// ladder: sharp money present, or a nonzero simulation result.
    pub fn has_other_active_signal(&self) -> bool {
        (self.has_sharp && self.sharp_pct > 0.0)
            || (self.has_simulation && self.sim_win_prob > 0.0)
    }
}

/// One betting opportunity on a slate. `candidate_key` is stable across
/// repeated computations of the same opportunity within a slate; for game
/// markets `matchup_or_player` names the matchup, for props the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub sport: String,
    pub market_kind: MarketKind,
    pub matchup_or_player: String,
    pub line: f64,
    pub side: String,
    /// Event start, epoch seconds UTC. Defines the slate date.
    pub start_time: u64,
    pub candidate_key: String,
    pub scores: EngineScoreSet,
    #[serde(default)]
    pub signals: SideSignals,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_active_signal_requires_presence_and_value() {
        let mut s = SideSignals::default();
        assert!(!s.has_other_active_signal());

        // Value without flag does not count
        s.sim_win_prob = 0.7;
        assert!(!s.has_other_active_signal());

        s.has_simulation = true;
        assert!(s.has_other_active_signal());

        // Sharp flag with zero value does not count
        let mut s = SideSignals { has_sharp: true, ..Default::default() };
        assert!(!s.has_other_active_signal());
        s.sharp_pct = 62.0;
        assert!(s.has_other_active_signal());
    }
}
