use std::time::Duration;

use raw_sync::events::{Event, EventImpl, EventInit, EventState};
use raw_sync::Timeout;

use crate::errors::{KernelError, Result};

/// Upper bound on any wait before the caller re-checks the open flag.
pub const RECHECK: Duration = Duration::from_secs(1);

/// Process-shared event living inside the arena.
pub struct Notifier {
    inner: Box<dyn EventImpl>,
}

impl Notifier {
    /// Bytes one event occupies, rounded to a cache line.
    pub fn stride() -> usize {
        let raw = Event::size_of(None);
        (raw + 63) & !63
    }

    /// # Safety
    /// `mem` must point at `stride()` zeroed bytes of the mapped arena.
    pub unsafe fn init(mem: *mut u8, auto_reset: bool) -> Result<Notifier> {
        let (inner, _) = Event::new(mem, auto_reset).map_err(KernelError::event)?;
        Ok(Notifier { inner })
    }

    /// # Safety
    /// `mem` must point at an event previously set up with `init`.
    pub unsafe fn existing(mem: *mut u8) -> Result<Notifier> {
        let (inner, _) = Event::from_existing(mem).map_err(KernelError::event)?;
        Ok(Notifier { inner })
    }

    pub fn notify(&self) -> Result<()> {
        self.inner
            .set(EventState::Signaled)
            .map_err(KernelError::event)
    }

    /// Parks for at most `RECHECK`. Returns whether the event fired; a
    /// timeout is not an error, the caller simply re-checks its condition.
    pub fn wait_bounded(&self) -> bool {
        self.wait_for(RECHECK)
    }

    pub fn wait_for(&self, timeout: Duration) -> bool {
        self.inner.wait(Timeout::Val(timeout.min(RECHECK))).is_ok()
    }
}
