use std::error::Error;

use crate::config::FacilityConfig;
use crate::core::sem::Sem;
use crate::core::Arena;
use crate::model::Party;

mod queue_tests;
mod supervisor_tests;

type TestResult<T = ()> = Result<T, Box<dyn Error>>;

fn small_config() -> FacilityConfig {
    FacilityConfig {
        queue_capacity: 3,
        belt_length: 12,
        belt_tick_ms: 20,
        kitchen_cook_ms: 10,
        party_dwell_ms: 400,
        supervisor_interval_ms: 100,
        ..Default::default()
    }
}

fn setup_arena(cfg: &FacilityConfig) -> TestResult<Arena> {
    Ok(Arena::create(cfg)?)
}

/// A party that already holds its coat hooks, the way an arrival worker
/// hands it over.
fn checked_in(arena: &Arena, id: i32, adults: u32, children: u32) -> TestResult<Party> {
    let party = Party::new(id, adults, children, false, adults + children);
    assert!(arena.sems().take_nowait(Sem::Hooks, party.size as u16)?);
    Ok(party)
}
