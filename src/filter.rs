//! Concentration filter: per-request output shaping over the whole batch.
//!
//! Runs after every candidate has finished scoring (caps are
//! batch-relative). Dedup keeps the best instance of a repeated key;
//! market floors and concentration caps select by descending final score
//! with lexicographic candidate_key as the deterministic tie-break; and
//! Monitor/Pass are stripped here, the output boundary, no matter what a
//! caller asked for.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::candidate::MarketKind;
use crate::pipeline::ScoredCandidate;
use crate::state::Config;

pub fn concentrate(scored: Vec<ScoredCandidate>, cfg: &Config) -> Vec<ScoredCandidate> {
    // Dedup by candidate_key, keeping the highest final_score instance.
    let mut best: HashMap<String, ScoredCandidate> = HashMap::new();
    for s in scored {
        let keep = match best.get(&s.candidate.candidate_key) {
            Some(existing) => s.final_score > existing.final_score,
            None => true,
        };
        if keep {
            best.insert(s.candidate.candidate_key.clone(), s);
        }
    }

    // Internal tiers drop before the caps so they never consume a slot;
    // market floors apply per kind.
    let mut survivors: Vec<ScoredCandidate> = best
        .into_values()
        .filter(|s| s.tier.is_persisted())
        .filter(|s| s.final_score >= market_floor(s, cfg))
        .collect();

    // Deterministic selection order: score descending, key ascending.
    survivors.sort_by(rank_order);

    // Concentration caps, greedy in rank order.
    let mut per_matchup: HashMap<String, usize> = HashMap::new();
    let mut per_sport: HashMap<String, usize> = HashMap::new();
    let mut prop_players: HashSet<String> = HashSet::new();

    let mut out = Vec::with_capacity(survivors.len());
    for s in survivors {
        let sport_count = per_sport.entry(s.candidate.sport.clone()).or_insert(0);
        if *sport_count >= cfg.max_picks_per_sport {
            continue;
        }
        match s.candidate.market_kind {
            MarketKind::Game => {
                let matchup_count =
                    per_matchup.entry(s.candidate.matchup_or_player.clone()).or_insert(0);
                if *matchup_count >= cfg.max_picks_per_matchup {
                    continue;
                }
                *matchup_count += 1;
            }
            MarketKind::Prop => {
                // At most one prop per player.
                if !prop_players.insert(s.candidate.matchup_or_player.clone()) {
                    continue;
                }
            }
        }
        *per_sport.get_mut(&s.candidate.sport).expect("sport entry just inserted") += 1;
        out.push(s);
    }
    out
}

fn market_floor(s: &ScoredCandidate, cfg: &Config) -> f64 {
    match s.candidate.market_kind {
        MarketKind::Game => cfg.game_score_floor,
        MarketKind::Prop => cfg.prop_score_floor,
    }
}

fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.final_score
        .partial_cmp(&a.final_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.candidate.candidate_key.cmp(&b.candidate.candidate_key))
}
