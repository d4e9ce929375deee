//! Signal wiring. Handlers only flip flags or bump a counter; every
//! decision based on them is made by the ordinary loops.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use signal_hook::consts::{SIGINT, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use tracing::{info, warn};

use crate::core::Arena;
use crate::errors::{KernelError, Result};

pub const SPEED_BASE_PERCENT: u32 = 100;
pub const SPEED_MAX_PERCENT: u32 = 400;
pub const SPEED_MIN_PERCENT: u32 = 25;

/// Service speed multiplier in percent.
#[derive(Clone, Debug)]
pub struct ThroughputControl {
    percent: Arc<AtomicU32>,
}

impl Default for ThroughputControl {
    fn default() -> Self {
        ThroughputControl {
            percent: Arc::new(AtomicU32::new(SPEED_BASE_PERCENT)),
        }
    }
}

impl ThroughputControl {
    pub fn percent(&self) -> u32 {
        self.percent.load(Ordering::SeqCst)
    }

    pub fn raise(&self) -> u32 {
        self.adjust(|p| (p * 2).min(SPEED_MAX_PERCENT))
    }

    pub fn lower(&self) -> u32 {
        self.adjust(|p| (p / 2).max(SPEED_MIN_PERCENT))
    }

    fn adjust<F: Fn(u32) -> u32>(&self, f: F) -> u32 {
        let mut current = self.percent();
        loop {
            let next = f(current);
            match self
                .percent
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(found) => current = found,
            }
        }
    }

    pub fn items_per_cycle(&self, base: u32) -> u32 {
        (base * self.percent() / 100).max(1)
    }

    /// SIGUSR1 raises, SIGUSR2 lowers. The listening thread lives for the
    /// rest of the process.
    pub fn listen(&self) -> Result<()> {
        let mut signals = Signals::new(&[SIGUSR1, SIGUSR2]).map_err(KernelError::SignalHook)?;
        let control = self.clone();
        thread::Builder::new()
            .name("throughput-signals".into())
            .spawn(move || {
                for signal in signals.forever() {
                    let now = match signal {
                        SIGUSR1 => control.raise(),
                        SIGUSR2 => control.lower(),
                        _ => continue,
                    };
                    info!("service speed now {}%", now);
                }
            })?;
        Ok(())
    }
}

/// Workers stop waiting on SIGTERM. SIGINT belongs to the facility, which
/// closes in an orderly way, so workers swallow it.
pub fn install_worker_signals(arena: &Arena) -> Result<()> {
    signal_hook::flag::register(SIGTERM, arena.halt_flag()).map_err(KernelError::SignalHook)?;
    signal_hook::flag::register(SIGINT, Arc::new(AtomicBool::new(false)))
        .map_err(KernelError::SignalHook)?;
    Ok(())
}

/// Flag the facility polls to close early on SIGINT or SIGTERM.
pub fn install_facility_signals() -> Result<Arc<AtomicBool>> {
    let close = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, close.clone()).map_err(KernelError::SignalHook)?;
    }
    Ok(close)
}

/// Sends `signal` to `pid`. A missing process is reported, not fatal.
pub fn send(pid: i32, signal: libc::c_int) -> bool {
    if pid <= 0 {
        return false;
    }
    let rc = unsafe { libc::kill(pid, signal) };
    if rc != 0 {
        warn!(
            "signal {} to pid {} failed: {}",
            signal,
            pid,
            std::io::Error::last_os_error()
        );
    }
    rc == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_doubles_until_cap() {
        let control = ThroughputControl::default();
        assert_eq!(control.raise(), 200);
        assert_eq!(control.raise(), 400);
        assert_eq!(control.raise(), 400);
        assert_eq!(control.items_per_cycle(2), 8);
    }

    #[test]
    fn lower_halves_until_floor() {
        let control = ThroughputControl::default();
        assert_eq!(control.lower(), 50);
        assert_eq!(control.lower(), 25);
        assert_eq!(control.lower(), 25);
        assert_eq!(control.items_per_cycle(2), 1);
    }

    #[test]
    fn clones_share_the_multiplier() {
        let control = ThroughputControl::default();
        let other = control.clone();
        other.raise();
        assert_eq!(control.percent(), 200);
    }
}
