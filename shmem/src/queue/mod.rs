//! Bounded hand-off of waiting parties between arrival workers and the
//! seating service.
//!
//! The SysV message queue carries the records. Occupancy is kept in the
//! arena under the QUEUE semaphore, and both the occupancy update and the
//! transport call happen under that lock so the two can never disagree.
//! Producers and consumers park on the arena's not-full / not-empty events
//! for at most one re-check interval at a time.

use tracing::trace;

use crate::core::event::RECHECK;
use crate::core::transport::SendOutcome;
use crate::core::{Arena, EventSlot};
use crate::errors::Result;
use crate::model::Party;

#[derive(Debug, PartialEq, Eq)]
enum Attempt<T> {
    Done(T),
    Wait,
}

pub struct BoundedPartyQueue<'a> {
    arena: &'a Arena,
}

impl<'a> BoundedPartyQueue<'a> {
    pub fn new(arena: &'a Arena) -> BoundedPartyQueue<'a> {
        BoundedPartyQueue { arena }
    }

    pub fn capacity(&self) -> Result<u32> {
        Ok(self.arena.read_queue()?.capacity)
    }

    pub fn occupancy(&self) -> Result<u32> {
        Ok(self.arena.read_queue()?.occupancy)
    }

    fn try_push(&self, party: &Party) -> Result<Attempt<()>> {
        let transport = self.arena.transport();
        self.arena.write_queue(|q| {
            if q.occupancy >= q.capacity {
                return Ok(Attempt::Wait);
            }
            match transport.try_send(party)? {
                SendOutcome::Sent => {
                    q.occupancy += 1;
                    q.waiting_headcount += party.size;
                    Ok(Attempt::Done(()))
                }
                SendOutcome::Full => Ok(Attempt::Wait),
            }
        })?
    }

    fn try_pop(&self) -> Result<Attempt<Party>> {
        let transport = self.arena.transport();
        self.arena.write_queue(|q| {
            if q.occupancy == 0 {
                return Ok(Attempt::Wait);
            }
            match transport.try_recv()? {
                Some(party) => {
                    q.occupancy -= 1;
                    q.waiting_headcount = q.waiting_headcount.saturating_sub(party.size);
                    Ok(Attempt::Done(party))
                }
                None => Ok(Attempt::Wait),
            }
        })?
    }

    /// Blocks while the queue is full. Returns `false` when the facility
    /// closed first; the party was not queued and stays with the caller.
    pub fn enqueue(&self, party: &Party) -> Result<bool> {
        loop {
            if self.arena.should_stop() {
                return Ok(false);
            }
            if let Attempt::Done(()) = self.try_push(party)? {
                self.arena.notifier(EventSlot::QueueNotEmpty).notify()?;
                return Ok(true);
            }
            trace!("queue full, party {} waits", party.id);
            self.arena
                .notifier(EventSlot::QueueNotFull)
                .wait_for(RECHECK);
        }
    }

    /// Blocks while the queue is empty. `None` once the facility closed.
    pub fn dequeue(&self) -> Result<Option<Party>> {
        loop {
            if self.arena.should_stop() {
                return Ok(None);
            }
            if let Some(party) = self.try_dequeue()? {
                return Ok(Some(party));
            }
            self.arena
                .notifier(EventSlot::QueueNotEmpty)
                .wait_for(RECHECK);
        }
    }

    /// Takes a party if one is queued, without waiting and regardless of
    /// the open flag. Used to drain the queue after close.
    pub fn try_dequeue(&self) -> Result<Option<Party>> {
        match self.try_pop()? {
            Attempt::Done(party) => {
                self.arena.notifier(EventSlot::QueueNotFull).notify()?;
                Ok(Some(party))
            }
            Attempt::Wait => Ok(None),
        }
    }
}
