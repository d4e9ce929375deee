//! Worker role entry points. Each process runs exactly one of these after
//! creating or attaching to the arena.

mod arrival;
mod cloakroom;
mod facility;
mod kitchen;
mod service;
mod supervisor;

use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

pub use self::arrival::{generate_party, run_arrival_generator};
pub use self::cloakroom::run_cloakroom;
pub use self::facility::run_facility;
pub use self::kitchen::run_kitchen;
pub use self::service::run_seating_service;
pub use self::supervisor::run_supervisor;

use crate::core::sem::Sem;
use crate::core::Arena;
use crate::errors::{KernelError, Result};
use crate::model::{tier_of, Party};

/// Process exit code for a finished role. A torn-down arena is a clean
/// exit; anything else is fatal.
pub fn exit_code(role: &str, result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) if e.is_destroyed() => {
            debug!("{}: facility already torn down, exiting", role);
            0
        }
        Err(e) => {
            error!("{} failed: {}", role, e);
            1
        }
    }
}

/// Sleeps for `period`, waking early once the arena stops.
pub(crate) fn pause(arena: &Arena, period: Duration) {
    let step = Duration::from_millis(50);
    let mut left = period;
    while !left.is_zero() && !arena.should_stop() {
        let nap = left.min(step);
        thread::sleep(nap);
        left -= nap;
    }
}

/// Returns the party's coat hooks and counts it as leaving unserved.
pub(crate) fn abandon(arena: &Arena, party: &Party, why: &str) -> Result<()> {
    arena.sems().post(Sem::Hooks, party.size as u16)?;
    arena.write_counters(|c| c.abandoned += 1)?;
    info!(
        "party {} ({} guests) leaves without a table: {}",
        party.id, party.size, why
    );
    Ok(())
}

pub(crate) fn record_issued(arena: &Arena, price: u32) -> Result<()> {
    if let Some(tier) = tier_of(price) {
        arena.write_counters(|c| c.issued[tier] += 1)?;
    }
    Ok(())
}

pub(crate) fn record_waste(arena: &Arena, plates: usize) -> Result<()> {
    if plates > 0 {
        arena.write_counters(|c| c.wasted += plates as u64)?;
    }
    Ok(())
}

pub(crate) fn join_all(results: Vec<thread::Result<Result<()>>>) -> Result<()> {
    let mut first = Ok(());
    for result in results {
        let result = result.unwrap_or_else(|panic| {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(KernelError::WorkerPanic(msg))
        });
        if first.is_ok() {
            first = result;
        }
    }
    first
}
