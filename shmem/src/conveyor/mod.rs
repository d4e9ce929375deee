//! The belt: a fixed ring of plate positions. Position `k` is the stop in
//! front of table `k`. Depositing turns the belt until the head position
//! is free (always at least one step) and puts the plate at the head.
//! Tables only ever look at their own position.
//!
//! Lives inside the seating service process; its threads share it through
//! one mutex covering the whole ring, because a deposit rotates every slot.

use std::sync::{Condvar, Mutex};

use crate::core::event::RECHECK;
use crate::errors::Result;

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct Plate {
    /// 0 = empty position.
    pub price: u32,
    /// Table the plate is reserved for, `None` for a generic plate.
    pub reserved_for: Option<u32>,
}

impl Plate {
    pub fn is_empty(&self) -> bool {
        self.price == 0
    }
}

#[derive(Debug)]
pub struct Belt {
    slots: Vec<Plate>,
    occupied: usize,
}

impl Belt {
    pub fn new(len: usize) -> Belt {
        Belt {
            slots: vec![Plate::default(); len],
            occupied: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn is_full(&self) -> bool {
        self.occupied >= self.slots.len()
    }

    pub fn at(&self, position: usize) -> Option<&Plate> {
        self.slots.get(position)
    }

    /// The tail plate moves to the head, everything else one stop on.
    pub fn rotate(&mut self) {
        self.slots.rotate_right(1);
    }

    /// Gives the plate back when no position is free.
    pub fn place(&mut self, price: u32, reserved_for: Option<u32>) -> std::result::Result<(), Plate> {
        let plate = Plate {
            price,
            reserved_for,
        };
        if self.is_full() || price == 0 {
            return Err(plate);
        }
        loop {
            self.rotate();
            if self.slots[0].is_empty() {
                break;
            }
        }
        self.slots[0] = plate;
        self.occupied += 1;
        Ok(())
    }

    /// Takes the plate at `table`'s own stop if it is generic or reserved
    /// for that table. A plate reserved for another table stays put.
    pub fn take(&mut self, table: u32) -> Option<Plate> {
        let slot = self.slots.get_mut(table as usize)?;
        if slot.is_empty() {
            return None;
        }
        match slot.reserved_for {
            Some(owner) if owner != table => None,
            _ => {
                let plate = *slot;
                *slot = Plate::default();
                self.occupied -= 1;
                Some(plate)
            }
        }
    }

    pub fn discard_reserved(&mut self, table: u32) -> Vec<Plate> {
        let mut gone = Vec::new();
        for slot in self.slots.iter_mut() {
            if !slot.is_empty() && slot.reserved_for == Some(table) {
                gone.push(*slot);
                *slot = Plate::default();
            }
        }
        self.occupied -= gone.len();
        gone
    }

    pub fn clear(&mut self) -> Vec<Plate> {
        let gone: Vec<Plate> = self.slots.iter().copied().filter(|p| !p.is_empty()).collect();
        self.slots.iter_mut().for_each(|p| *p = Plate::default());
        self.occupied = 0;
        gone
    }

    #[cfg(test)]
    fn count_nonempty(&self) -> usize {
        self.slots.iter().filter(|p| !p.is_empty()).count()
    }
}

pub struct DeliveryConveyor {
    belt: Mutex<Belt>,
    freed: Condvar,
}

impl DeliveryConveyor {
    pub fn new(len: usize) -> DeliveryConveyor {
        DeliveryConveyor {
            belt: Mutex::new(Belt::new(len)),
            freed: Condvar::new(),
        }
    }

    /// Blocks while the belt is full, waking at least every `RECHECK` to
    /// ask `keep_waiting`. Returns whether the plate went on the belt.
    fn deposit_inner<F>(&self, price: u32, reserved_for: Option<u32>, keep_waiting: F) -> Result<bool>
    where
        F: Fn() -> bool,
    {
        let mut belt = self.belt.lock()?;
        loop {
            if belt.place(price, reserved_for).is_ok() {
                return Ok(true);
            }
            if price == 0 || !keep_waiting() {
                return Ok(false);
            }
            let (guard, _) = self.freed.wait_timeout(belt, RECHECK)?;
            belt = guard;
        }
    }

    pub fn deposit<F>(&self, price: u32, keep_waiting: F) -> Result<bool>
    where
        F: Fn() -> bool,
    {
        self.deposit_inner(price, None, keep_waiting)
    }

    pub fn deposit_reserved<F>(&self, price: u32, table: u32, keep_waiting: F) -> Result<bool>
    where
        F: Fn() -> bool,
    {
        self.deposit_inner(price, Some(table), keep_waiting)
    }

    pub fn try_deposit(&self, price: u32, reserved_for: Option<u32>) -> Result<bool> {
        Ok(self.belt.lock()?.place(price, reserved_for).is_ok())
    }

    pub fn claim(&self, table: u32) -> Result<Option<Plate>> {
        let plate = self.belt.lock()?.take(table);
        if plate.is_some() {
            self.freed.notify_all();
        }
        Ok(plate)
    }

    /// The belt moving one stop with nothing being added.
    pub fn advance(&self) -> Result<()> {
        self.belt.lock()?.rotate();
        Ok(())
    }

    pub fn occupied(&self) -> Result<usize> {
        Ok(self.belt.lock()?.occupied())
    }

    pub fn free_slots(&self) -> Result<usize> {
        let belt = self.belt.lock()?;
        Ok(belt.len() - belt.occupied())
    }

    pub fn discard_reserved(&self, table: u32) -> Result<Vec<Plate>> {
        let gone = self.belt.lock()?.discard_reserved(table);
        if !gone.is_empty() {
            self.freed.notify_all();
        }
        Ok(gone)
    }

    pub fn clear(&self) -> Result<Vec<Plate>> {
        let gone = self.belt.lock()?.clear();
        self.freed.notify_all();
        Ok(gone)
    }

    /// Wakes depositors parked on a full belt, e.g. after close.
    pub fn wake_all(&self) {
        self.freed.notify_all();
    }
}
