use std::process;
use std::time::Duration;

use tracing::{info, info_span, warn};

use super::pause;
use crate::config::FacilityConfig;
use crate::core::sem::Sem;
use crate::core::Arena;
use crate::errors::Result;
use crate::model::{is_special, PRICES};
use crate::turns::{Phase, Role, TurnSequencer};

/// Cooks plates onto the pass while the facility is open, then reports
/// right after the seating summary.
pub fn run_kitchen(arena: &Arena, cfg: &FacilityConfig) -> Result<()> {
    let span = info_span!("kitchen", pid = process::id());
    let _entered = span.enter();

    let cook = Duration::from_millis(cfg.kitchen_cook_ms);
    let mut cooked = 0u64;
    while !arena.should_stop() {
        pause(arena, cook);
        if arena.sems().value(Sem::Pass)? < cfg.pass_capacity as i32 {
            arena.sems().post(Sem::Pass, 1)?;
            cooked += 1;
        }
    }
    info!("kitchen stops cooking after {} plates", cooked);

    let turns = TurnSequencer::new(arena);
    if !turns.await_phase(Phase::KitchenSummary)? {
        warn!("halted before the kitchen summary");
        return Ok(());
    }
    let counters = arena.read_counters()?;
    info!("=== kitchen summary ===");
    for (tier, price) in PRICES.iter().enumerate() {
        let kind = if is_special(*price) { "specials" } else { "plates" };
        info!(
            "{} at {:>2}: issued {:>4}, sold {:>4}",
            kind, price, counters.issued[tier], counters.sold[tier]
        );
    }
    info!(
        "revenue {}, {} plates wasted, {} left unused at the pass",
        counters.revenue(),
        counters.wasted,
        arena.sems().value(Sem::Pass)?
    );
    turns.advance(Role::Kitchen, Phase::KitchenSummary)?;
    Ok(())
}
