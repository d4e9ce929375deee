use std::process;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::{info, info_span, warn};

use super::pause;
use crate::config::FacilityConfig;
use crate::core::Arena;
use crate::errors::Result;
use crate::supervisor::signals;
use crate::turns::{Phase, TurnSequencer};

const SIGNAL_RAISE: i32 = 1;
const SIGNAL_LOWER: i32 = 2;
/// How many doublings the supervisor asks for at most.
const MAX_BOOST: u32 = 2;

/// Watches the queue and nudges the service speed up or down.
pub fn run_supervisor(arena: &Arena, cfg: &FacilityConfig) -> Result<()> {
    let span = info_span!("supervisor", pid = process::id());
    let _entered = span.enter();

    let interval = Duration::from_millis(cfg.supervisor_interval_ms);
    let mut boost = 0u32;
    while !arena.should_stop() {
        pause(arena, interval);
        let queue = arena.read_queue()?;
        let counters = arena.read_counters()?;
        info!(
            "queued {} parties ({} guests), {} arrival workers, {} seated so far, {} departed",
            queue.occupancy,
            queue.waiting_headcount,
            queue.active_workers,
            counters.admitted,
            counters.departed
        );

        let pid = arena.service_pid();
        if queue.waiting_headcount >= cfg.queue_high_watermark && boost < MAX_BOOST {
            if signals::send(pid, libc::SIGUSR1) {
                boost += 1;
                arena.header().speed_signal.store(SIGNAL_RAISE, Ordering::SeqCst);
                info!("queue long, asked service to speed up");
            }
        } else if queue.waiting_headcount <= cfg.queue_low_watermark && boost > 0 {
            if signals::send(pid, libc::SIGUSR2) {
                boost -= 1;
                arena.header().speed_signal.store(SIGNAL_LOWER, Ordering::SeqCst);
                info!("queue short, asked service to slow down");
            }
        }
    }

    if !TurnSequencer::new(arena).await_phase(Phase::Done)? {
        warn!("halted before the final report");
        return Ok(());
    }
    let counters = arena.read_counters()?;
    info!(
        "final: {} parties generated, {} seated, {} departed, {} turned away, revenue {}",
        counters.generated,
        counters.admitted,
        counters.departed,
        counters.abandoned,
        counters.revenue()
    );
    Ok(())
}
