//! Ordered hand-off of the closing reports.
//!
//! One token in the arena header moves Open → SeatingSummary →
//! KitchenSummary → GeneratorExit → Done. Each step has exactly one role
//! allowed to take it, so the reports of unrelated processes always come
//! out in the same order.

use std::fmt;
use std::sync::atomic::Ordering;

use tracing::debug;

use crate::core::{Arena, EventSlot};
use crate::errors::{KernelError, Result};

pub const PHASE_COUNT: usize = 5;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Phase {
    Open = 0,
    SeatingSummary = 1,
    KitchenSummary = 2,
    GeneratorExit = 3,
    Done = 4,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Role {
    Generator,
    Service,
    Kitchen,
    Supervisor,
    Cloakroom,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Generator => "generator",
            Role::Service => "service",
            Role::Kitchen => "kitchen",
            Role::Supervisor => "supervisor",
            Role::Cloakroom => "cloakroom",
        };
        f.write_str(name)
    }
}

impl Phase {
    pub fn from_token(token: u32) -> Option<Phase> {
        match token {
            0 => Some(Phase::Open),
            1 => Some(Phase::SeatingSummary),
            2 => Some(Phase::KitchenSummary),
            3 => Some(Phase::GeneratorExit),
            4 => Some(Phase::Done),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Phase> {
        Phase::from_token(self as u32 + 1)
    }

    /// The one role allowed to move the token past this phase.
    pub fn advancer(self) -> Option<Role> {
        match self {
            Phase::Open => Some(Role::Generator),
            Phase::SeatingSummary => Some(Role::Service),
            Phase::KitchenSummary => Some(Role::Kitchen),
            Phase::GeneratorExit => Some(Role::Generator),
            Phase::Done => None,
        }
    }
}

pub struct TurnSequencer<'a> {
    arena: &'a Arena,
}

impl<'a> TurnSequencer<'a> {
    pub fn new(arena: &'a Arena) -> TurnSequencer<'a> {
        TurnSequencer { arena }
    }

    pub fn current(&self) -> Phase {
        let token = self.arena.header().phase.load(Ordering::SeqCst);
        Phase::from_token(token).unwrap_or(Phase::Done)
    }

    /// Parks until the token reaches `phase`. Returns `false` if this
    /// process was told to halt first. The facility closing does not abort
    /// the wait: closing is what sets the phases in motion.
    pub fn await_phase(&self, phase: Phase) -> Result<bool> {
        self.await_phase_until(phase, || self.arena.is_halted())
    }

    /// Same as `await_phase` but gives up as soon as `give_up` says so,
    /// checked at least once per re-check interval.
    pub fn await_phase_until<F>(&self, phase: Phase, mut give_up: F) -> Result<bool>
    where
        F: FnMut() -> bool,
    {
        let event = self.arena.notifier(EventSlot::Phase(phase as usize));
        loop {
            if self.current() >= phase {
                return Ok(true);
            }
            if give_up() {
                return Ok(false);
            }
            event.wait_bounded();
        }
    }

    /// Moves the token from `from` to the next phase. Only `from`'s
    /// advancer may do this, and only once.
    pub fn advance(&self, role: Role, from: Phase) -> Result<Phase> {
        if from.advancer() != Some(role) {
            return Err(KernelError::Turn(format!("{} may not end phase {:?}", role, from)));
        }
        let to = from
            .next()
            .ok_or_else(|| KernelError::Turn(format!("{:?} is the last phase", from)))?;
        self.arena
            .header()
            .phase
            .compare_exchange(from as u32, to as u32, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|found| {
                KernelError::Turn(format!(
                    "{} expected phase {:?}, found {:?}",
                    role,
                    from,
                    Phase::from_token(found)
                ))
            })?;
        debug!("{} advanced turn {:?} -> {:?}", role, from, to);
        self.arena.notifier(EventSlot::Phase(to as usize)).notify()?;
        Ok(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_run_in_order() {
        let mut phase = Phase::Open;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            seen.push(next);
            phase = next;
        }
        assert_eq!(seen.len(), PHASE_COUNT);
        assert_eq!(seen.last(), Some(&Phase::Done));
        assert!(Phase::SeatingSummary < Phase::KitchenSummary);
    }

    #[test]
    fn each_phase_has_one_advancer() {
        assert_eq!(Phase::Open.advancer(), Some(Role::Generator));
        assert_eq!(Phase::SeatingSummary.advancer(), Some(Role::Service));
        assert_eq!(Phase::KitchenSummary.advancer(), Some(Role::Kitchen));
        assert_eq!(Phase::GeneratorExit.advancer(), Some(Role::Generator));
        assert_eq!(Phase::Done.advancer(), None);
    }
}
