//! Ledger audit: replay persisted picks and verify each record is
//! self-consistent.
//!
//! Every pick record carries the full scoring snapshot, so the published
//! tier and final score must be re-derivable offline without recomputing
//! engines or modifiers. Divergence means either the ledger was tampered
//! with or the running config drifted from the one that scored the slate;
//! both are worth knowing about.
//!
//! Exit status is nonzero when any record diverges.

use anyhow::Result;

use pickrank::ledger::PickLedger;
use pickrank::state::Config;
use pickrank::tier;

fn main() -> Result<()> {
    let cfg = Config::from_env();
    let picks = PickLedger::replay(&cfg.ledger_path)?;

    let mut divergent = 0usize;
    for pick in &picks {
        let s = &pick.scored;

        // Arithmetic check: final score from recorded components.
        let recomputed =
            ((s.base_score + s.post_base_total) * s.environmental_factor).clamp(0.0, 10.0);
        if (recomputed - s.final_score).abs() > 1e-6 {
            divergent += 1;
            println!(
                "DIVERGENT {} final_score recorded {:.4} recomputed {:.4}",
                pick.pick_id, s.final_score, recomputed
            );
            continue;
        }

        // Tier check: the decision table over the recorded inputs.
        let decision = tier::assign(
            s.final_score,
            s.titanium_flag,
            &s.adjusted_scores,
            s.confluence_level,
            &cfg,
        );
        if decision.tier != pick.published_tier {
            divergent += 1;
            println!(
                "DIVERGENT {} tier recorded {} re-derived {}",
                pick.pick_id,
                pick.published_tier.as_str(),
                decision.tier.as_str()
            );
        }

        // Boundary check: internal tiers must never have been persisted.
        if !pick.published_tier.is_persisted() {
            divergent += 1;
            println!(
                "DIVERGENT {} internal tier {} found in ledger",
                pick.pick_id,
                pick.published_tier.as_str()
            );
        }
    }

    println!("audited {} picks, {} divergent", picks.len(), divergent);
    if divergent > 0 {
        std::process::exit(1);
    }
    Ok(())
}
