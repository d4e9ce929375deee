//! First-fit table assignment under the TABLES semaphore.

use crate::core::Arena;
use crate::errors::Result;
use crate::model::{now_millis, Party, Table, NO_TABLE};

/// Scans in table order and seats `party` at the first table with room
/// for both its headcount and one more party.
pub fn seat_first_fit(tables: &mut [Table], party: &Party) -> Option<u32> {
    let table = tables.iter_mut().find(|t| t.fits(party))?;
    let mut seated = *party;
    seated.table = table.id as i32;
    seated.seated_at = now_millis();
    table.parties[table.party_count as usize] = seated;
    table.party_count += 1;
    table.occupied += party.size;
    table.seated_total += 1;
    table.guests_total += u64::from(party.size);
    Some(table.id)
}

/// Takes the party out and closes the gap, keeping the others in order.
/// Removing a party that is not there changes nothing.
pub fn remove_from_table(table: &mut Table, party_id: i32) -> Option<Party> {
    let count = table.party_count as usize;
    let pos = table.parties[..count].iter().position(|p| p.id == party_id)?;
    let removed = table.parties[pos];
    table.parties.copy_within(pos + 1..count, pos);
    table.parties[count - 1] = Party::default();
    table.party_count -= 1;
    table.occupied = table.occupied.saturating_sub(removed.size);
    let mut gone = removed;
    gone.table = NO_TABLE;
    Some(gone)
}

pub struct SeatAllocator<'a> {
    arena: &'a Arena,
}

impl<'a> SeatAllocator<'a> {
    pub fn new(arena: &'a Arena) -> SeatAllocator<'a> {
        SeatAllocator { arena }
    }

    /// Never blocks beyond the table lock. `None` means the caller keeps
    /// the party and tries again later.
    pub fn seat(&self, party: &Party) -> Result<Option<u32>> {
        let seated = self
            .arena
            .write_tables(|tables| seat_first_fit(tables, party))?;
        if seated.is_some() {
            self.arena.write_counters(|c| c.admitted += 1)?;
        }
        Ok(seated)
    }

    pub fn remove(&self, table_id: u32, party_id: i32) -> Result<Option<Party>> {
        self.arena.write_tables(|tables| {
            tables
                .get_mut(table_id as usize)
                .and_then(|t| remove_from_table(t, party_id))
        })
    }

    pub fn snapshot(&self, table_id: u32) -> Result<Option<Table>> {
        self.arena
            .read_tables(|tables| tables.get(table_id as usize).copied())
    }

    pub fn all(&self) -> Result<Vec<Table>> {
        self.arena.read_tables(|tables| tables.to_vec())
    }

    /// Runs `f` on the parties seated at `table_id` while the table lock is
    /// held. Claimed counts and special orders are only changed this way.
    pub fn with_table<R, F>(&self, table_id: u32, f: F) -> Result<Option<R>>
    where
        F: FnOnce(&mut [Party]) -> R,
    {
        self.arena.write_tables(|tables| {
            let table = tables.get_mut(table_id as usize)?;
            let count = table.party_count as usize;
            Some(f(&mut table.parties[..count]))
        })
    }

    /// Like `with_table` but across every table; used by the belt to
    /// collect special orders in one locked pass.
    pub fn for_each_party<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&mut Party),
    {
        self.arena.write_tables(|tables| {
            for table in tables.iter_mut() {
                let count = table.party_count as usize;
                table.parties[..count].iter_mut().for_each(&mut f);
            }
        })
    }
}
