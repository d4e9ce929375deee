use std::process;
use std::time::Duration;

use tracing::{debug, info, info_span, warn};

use super::pause;
use crate::config::FacilityConfig;
use crate::core::event::RECHECK;
use crate::core::sem::Sem;
use crate::core::Arena;
use crate::errors::Result;
use crate::turns::{Phase, TurnSequencer};

const RETURN_CHECKS: u32 = 5;

/// Keeps count of coat hooks. Every guest takes one on arrival and gets it
/// back on the way out, so after close all of them must come home.
pub fn run_cloakroom(arena: &Arena, cfg: &FacilityConfig) -> Result<()> {
    let span = info_span!("cloakroom", pid = process::id());
    let _entered = span.enter();

    let total = cfg.cloakroom_hooks as i32;
    let mut last_in_use = -1;
    while !arena.should_stop() {
        pause(arena, Duration::from_millis(cfg.supervisor_interval_ms));
        let in_use = total - arena.sems().value(Sem::Hooks)?;
        if in_use != last_in_use {
            debug!("{} of {} hooks in use", in_use, total);
            last_in_use = in_use;
        }
    }

    if !TurnSequencer::new(arena).await_phase(Phase::Done)? {
        warn!("halted before the cloakroom report");
        return Ok(());
    }
    let mut free = arena.sems().value(Sem::Hooks)?;
    for _ in 0..RETURN_CHECKS {
        if free >= total {
            break;
        }
        std::thread::sleep(RECHECK);
        free = arena.sems().value(Sem::Hooks)?;
    }
    if free >= total {
        info!("cloakroom: all {} hooks returned", total);
    } else {
        warn!("cloakroom: {} hooks never came back", total - free);
    }
    Ok(())
}
