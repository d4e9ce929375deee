//! Plain-old-data records that live in the arena or travel through the
//! message queue. Everything here is `#[repr(C)]`, `Copy` and valid when
//! zeroed, so a freshly created arena needs no per-field initialization.

use std::time::{SystemTime, UNIX_EPOCH};

/// Plates on the belt carry one of these prices. The first three are the
/// generic plates, the rest are specials ordered by a party.
pub const PRICES: [u32; 6] = [10, 15, 20, 40, 50, 60];
pub const TIER_COUNT: usize = PRICES.len();
pub const GENERIC_TIERS: usize = 3;

/// (capacity, number of tables) per capacity class, in scan order.
pub const TABLE_CLASSES: [(u32, usize); 4] = [(1, 2), (2, 3), (3, 3), (4, 2)];
pub const TABLE_COUNT: usize = 10;
pub const MAX_PARTIES_PER_TABLE: usize = 3;
pub const MAX_PARTY_SIZE: u32 = 4;

pub const NO_TABLE: i32 = -1;

const _: () = {
    let mut total = 0;
    let mut i = 0;
    while i < TABLE_CLASSES.len() {
        total += TABLE_CLASSES[i].1;
        i += 1;
    }
    assert!(total == TABLE_COUNT);
};

pub fn tier_of(price: u32) -> Option<usize> {
    PRICES.iter().position(|p| *p == price)
}

pub fn is_special(price: u32) -> bool {
    matches!(tier_of(price), Some(t) if t >= GENERIC_TIERS)
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[repr(C)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct Party {
    /// Pid of the arrival worker that created the party.
    pub id: i32,
    pub size: u32,
    pub adults: u32,
    pub children: u32,
    pub vip: bool,
    pub arrived_at: i64,
    pub seated_at: i64,
    pub table: i32,
    /// How many plates the party eats before it leaves.
    pub appetite: u32,
    pub claimed: [u32; TIER_COUNT],
    /// 0 = nothing ordered, > 0 = ordered and waiting for the kitchen,
    /// < 0 = on the belt, reserved for this party's table.
    pub special_price: i32,
}

impl Party {
    pub fn new(id: i32, adults: u32, children: u32, vip: bool, appetite: u32) -> Party {
        Party {
            id,
            size: adults + children,
            adults,
            children,
            vip,
            arrived_at: now_millis(),
            seated_at: 0,
            table: NO_TABLE,
            appetite,
            claimed: [0; TIER_COUNT],
            special_price: 0,
        }
    }

    pub fn claimed_total(&self) -> u32 {
        self.claimed.iter().sum()
    }

    pub fn bill(&self) -> u64 {
        self.claimed
            .iter()
            .zip(PRICES.iter())
            .map(|(n, p)| u64::from(*n) * u64::from(*p))
            .sum()
    }

    pub fn is_sated(&self) -> bool {
        self.claimed_total() >= self.appetite && self.special_price == 0
    }

    pub fn awaits_special(&self) -> bool {
        self.special_price < 0
    }

    /// Same party as it was handed off, ignoring fields written after seating.
    pub fn same_identity(&self, other: &Party) -> bool {
        self.id == other.id
            && self.size == other.size
            && self.adults == other.adults
            && self.children == other.children
    }
}

#[repr(C)]
#[derive(Default, Copy, Clone, Debug)]
pub struct Table {
    pub id: u32,
    pub capacity: u32,
    pub occupied: u32,
    pub party_count: u32,
    pub parties: [Party; MAX_PARTIES_PER_TABLE],
    pub seated_total: u64,
    pub guests_total: u64,
}

impl Table {
    pub fn new(id: u32, capacity: u32) -> Table {
        Table {
            id,
            capacity,
            ..Default::default()
        }
    }

    pub fn seated(&self) -> &[Party] {
        &self.parties[..self.party_count as usize]
    }

    pub fn fits(&self, party: &Party) -> bool {
        self.occupied + party.size <= self.capacity
            && (self.party_count as usize) < MAX_PARTIES_PER_TABLE
    }
}

/// Builds the fixed table partition in scan order.
pub fn table_layout() -> [Table; TABLE_COUNT] {
    let mut tables = [Table::default(); TABLE_COUNT];
    let mut id = 0usize;
    for (capacity, count) in TABLE_CLASSES.iter() {
        for _ in 0..*count {
            tables[id] = Table::new(id as u32, *capacity);
            id += 1;
        }
    }
    tables
}

/// Counters guarded by the COUNTERS semaphore.
#[repr(C)]
#[derive(Default, Copy, Clone, Debug)]
pub struct Counters {
    pub issued: [u64; TIER_COUNT],
    pub sold: [u64; TIER_COUNT],
    pub wasted: u64,
    pub admitted: u64,
    pub departed: u64,
    pub abandoned: u64,
    pub generated: u64,
}

impl Counters {
    pub fn revenue(&self) -> u64 {
        self.sold
            .iter()
            .zip(PRICES.iter())
            .map(|(n, p)| n * u64::from(*p))
            .sum()
    }
}

/// Queue bookkeeping guarded by the QUEUE semaphore.
#[repr(C)]
#[derive(Default, Copy, Clone, Debug)]
pub struct QueueState {
    pub occupancy: u32,
    pub waiting_headcount: u32,
    pub active_workers: u32,
    pub capacity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_sorted_by_capacity_class() {
        let tables = table_layout();
        let caps: Vec<u32> = tables.iter().map(|t| t.capacity).collect();
        assert_eq!(caps, vec![1, 1, 2, 2, 2, 3, 3, 3, 4, 4]);
        for (i, t) in tables.iter().enumerate() {
            assert_eq!(t.id as usize, i);
        }
    }

    #[test]
    fn bill_sums_claimed_plates() {
        let mut party = Party::new(7, 2, 1, false, 3);
        party.claimed[0] = 2;
        party.claimed[4] = 1;
        assert_eq!(party.bill(), 2 * 10 + 50);
        assert_eq!(party.claimed_total(), 3);
        assert!(party.is_sated());
        party.special_price = -50;
        assert!(!party.is_sated());
    }

    #[test]
    fn specials_are_the_upper_tiers() {
        assert!(!is_special(10));
        assert!(is_special(40));
        assert!(!is_special(11));
        assert_eq!(tier_of(20), Some(2));
    }
}
