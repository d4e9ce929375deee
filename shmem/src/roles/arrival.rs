use std::process;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, info_span};

use super::{abandon, pause};
use crate::config::FacilityConfig;
use crate::core::sem::Sem;
use crate::core::Arena;
use crate::errors::Result;
use crate::model::{Party, MAX_PARTY_SIZE};
use crate::queue::BoundedPartyQueue;
use crate::seating::SeatAllocator;

const HOOK_RETRY: Duration = Duration::from_millis(100);
const VIP_RETRY: Duration = Duration::from_millis(200);

/// At least one adult, and no more than three children per adult.
pub fn generate_party<R: Rng>(id: i32, cfg: &FacilityConfig, rng: &mut R) -> Party {
    let size = rng.gen_range(1..=MAX_PARTY_SIZE);
    let min_adults = ((size + 3) / 4).max(1);
    let adults = rng.gen_range(min_adults..=size);
    let vip = rng.gen_range(0..100) < cfg.vip_percent;
    let appetite = size * rng.gen_range(1..=3);
    Party::new(id, adults, size - adults, vip, appetite)
}

fn take_hooks(arena: &Arena, n: u32) -> Result<bool> {
    loop {
        if arena.should_stop() {
            return Ok(false);
        }
        if arena.sems().take_nowait(Sem::Hooks, n as u16)? {
            return Ok(true);
        }
        pause(arena, HOOK_RETRY);
    }
}

fn seat_vip(arena: &Arena, party: &Party) -> Result<bool> {
    let seats = SeatAllocator::new(arena);
    loop {
        if arena.should_stop() {
            return Ok(false);
        }
        if let Some(table) = seats.seat(party)? {
            info!("VIP party {} ({} guests) seated at table {}", party.id, party.size, table);
            return Ok(true);
        }
        pause(arena, VIP_RETRY);
    }
}

pub fn run_arrival_generator(arena: &Arena, cfg: &FacilityConfig) -> Result<()> {
    let pid = process::id() as i32;
    let span = info_span!("arrival", pid);
    let _entered = span.enter();

    let party = generate_party(pid, cfg, &mut rand::thread_rng());
    arena.write_counters(|c| c.generated += 1)?;
    debug!(
        "party of {} ({} adults, {} children{})",
        party.size,
        party.adults,
        party.children,
        if party.vip { ", VIP" } else { "" }
    );

    if !take_hooks(arena, party.size)? {
        arena.write_counters(|c| c.abandoned += 1)?;
        info!("party {} turned away at the cloakroom, facility closed", pid);
        return Ok(());
    }

    let handed_off = if party.vip {
        seat_vip(arena, &party)?
    } else {
        BoundedPartyQueue::new(arena).enqueue(&party)?
    };
    if !handed_off {
        abandon(arena, &party, "facility closed while waiting")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_parties_respect_composition_rules() {
        let cfg = FacilityConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for id in 0..500 {
            let party = generate_party(id, &cfg, &mut rng);
            assert!(party.size >= 1 && party.size <= MAX_PARTY_SIZE);
            assert_eq!(party.adults + party.children, party.size);
            assert!(party.adults >= 1);
            assert!(party.children <= 3 * party.adults);
            assert!(party.appetite >= party.size);
            assert_eq!(party.table, crate::model::NO_TABLE);
        }
    }

    #[test]
    fn vip_share_follows_config() {
        let cfg = FacilityConfig {
            vip_percent: 100,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..20).all(|id| generate_party(id, &cfg, &mut rng).vip));
        let cfg = FacilityConfig {
            vip_percent: 0,
            ..Default::default()
        };
        assert!((0..20).all(|id| !generate_party(id, &cfg, &mut rng).vip));
    }
}
