use std::collections::VecDeque;
use std::process;
use std::thread;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, info_span, warn};

use super::{abandon, join_all, pause, record_issued, record_waste};
use crate::config::FacilityConfig;
use crate::conveyor::{DeliveryConveyor, Plate};
use crate::core::sem::Sem;
use crate::core::Arena;
use crate::errors::Result;
use crate::model::{now_millis, tier_of, Party, GENERIC_TIERS, PRICES, TABLE_COUNT, TIER_COUNT};
use crate::queue::BoundedPartyQueue;
use crate::seating::SeatAllocator;
use crate::supervisor::signals::ThroughputControl;
use crate::turns::{Phase, Role, TurnSequencer};

/// Parties pulled off the queue that found no table yet. The drain thread
/// stops pulling while this many are waiting.
const PENDING_LIMIT: usize = 4;
const PENDING_RETRY: Duration = Duration::from_millis(100);

pub fn run_seating_service(arena: &Arena, cfg: &FacilityConfig) -> Result<()> {
    let span = info_span!("service", pid = process::id());
    let _entered = span.enter();

    arena.set_service_pid(process::id() as i32);
    let control = ThroughputControl::default();
    control.listen()?;
    let conveyor = DeliveryConveyor::new(cfg.belt_length);
    info!(
        "seating service up: {} tables, belt of {}",
        TABLE_COUNT, cfg.belt_length
    );

    let results = thread::scope(|s| {
        let conveyor = &conveyor;
        let control = &control;
        let mut handles = vec![
            s.spawn(move || drain_queue(arena)),
            s.spawn(move || run_belt(arena, cfg, conveyor, control)),
        ];
        for table in 0..TABLE_COUNT as u32 {
            handles.push(s.spawn(move || serve_table(arena, cfg, conveyor, table)));
        }
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    });
    join_all(results)?;

    let leftovers = conveyor.clear()?;
    if !leftovers.is_empty() {
        info!("{} plates left on the belt at close", leftovers.len());
    }
    record_waste(arena, leftovers.len())?;

    let turns = TurnSequencer::new(arena);
    if !turns.await_phase(Phase::SeatingSummary)? {
        warn!("halted before the seating summary");
        return Ok(());
    }
    // Every arrival worker is reaped by now. A party can still have been
    // seated after its table's thread swept it: a VIP that got in just as
    // the doors shut, or one the drain thread pulled off the queue last.
    let seats = SeatAllocator::new(arena);
    for table in seats.all()? {
        for party in table.seated() {
            depart(arena, &seats, table.id, party.id, "seated after close")?;
        }
    }
    // Whatever is still in the transport will never be taken by anyone else.
    let queue = BoundedPartyQueue::new(arena);
    while let Some(party) = queue.try_dequeue()? {
        abandon(arena, &party, "still queued at close")?;
    }
    report_seating(arena)?;
    turns.advance(Role::Service, Phase::SeatingSummary)?;
    Ok(())
}

fn report_seating(arena: &Arena) -> Result<()> {
    let tables = SeatAllocator::new(arena).all()?;
    let counters = arena.read_counters()?;
    info!("=== seating summary ===");
    for table in tables.iter() {
        info!(
            "table {:>2} (seats {}): {} parties, {} guests served",
            table.id, table.capacity, table.seated_total, table.guests_total
        );
    }
    info!(
        "admitted {} parties, {} departed, {} left without a table",
        counters.admitted, counters.departed, counters.abandoned
    );
    Ok(())
}

fn drain_queue(arena: &Arena) -> Result<()> {
    let queue = BoundedPartyQueue::new(arena);
    let seats = SeatAllocator::new(arena);
    let mut pending: VecDeque<Party> = VecDeque::new();

    while !arena.should_stop() {
        for _ in 0..pending.len() {
            let Some(party) = pending.pop_front() else { break };
            match seats.seat(&party)? {
                Some(table) => info!(
                    "party {} ({} guests) seated at table {}",
                    party.id, party.size, table
                ),
                None => pending.push_back(party),
            }
        }

        let next = if pending.is_empty() {
            queue.dequeue()?
        } else if pending.len() < PENDING_LIMIT {
            queue.try_dequeue()?
        } else {
            None
        };
        match next {
            Some(party) => match seats.seat(&party)? {
                Some(table) => info!(
                    "party {} ({} guests) seated at table {}",
                    party.id, party.size, table
                ),
                None => {
                    debug!("no table for party {} of {}, holding it", party.id, party.size);
                    pending.push_back(party);
                }
            },
            None if !pending.is_empty() => pause(arena, PENDING_RETRY),
            None => {}
        }
    }

    for party in pending {
        abandon(arena, &party, "no table before close")?;
    }
    Ok(())
}

fn run_belt(
    arena: &Arena,
    cfg: &FacilityConfig,
    conveyor: &DeliveryConveyor,
    control: &ThroughputControl,
) -> Result<()> {
    let seats = SeatAllocator::new(arena);
    let mut rng = rand::thread_rng();
    let tick = Duration::from_millis(cfg.belt_tick_ms);
    let keep_waiting = || !arena.should_stop();

    while !arena.should_stop() {
        pause(arena, tick);
        conveyor.advance()?;
        let mut free = conveyor.free_slots()?;

        let mut orders = Vec::new();
        seats.for_each_party(|party| {
            if party.special_price > 0 && orders.len() < free {
                orders.push((party.table as u32, party.special_price as u32));
                party.special_price = -party.special_price;
            }
        })?;
        for (table, price) in orders {
            if conveyor.deposit_reserved(price, table, keep_waiting)? {
                record_issued(arena, price)?;
                free -= 1;
                debug!("special {} sent to table {}", price, table);
            }
        }

        let wanted = control.items_per_cycle(cfg.base_items_per_cycle) as usize;
        for _ in 0..wanted.min(free) {
            if !arena.sems().take_nowait(Sem::Pass, 1)? {
                break;
            }
            let price = PRICES[rng.gen_range(0..GENERIC_TIERS)];
            if conveyor.deposit(price, keep_waiting)? {
                record_issued(arena, price)?;
            } else {
                arena.sems().post(Sem::Pass, 1)?;
                break;
            }
        }
    }
    conveyor.wake_all();
    Ok(())
}

/// Credits `plate` to a party at the table. Reserved plates go to the
/// party waiting for that special; generic ones to the first party still
/// hungry. Returns the party id, or `None` when nobody is left to eat it.
fn attribute(
    seats: &SeatAllocator<'_>,
    table: u32,
    plate: Plate,
    order_special: Option<u32>,
) -> Result<Option<i32>> {
    let tier = match tier_of(plate.price) {
        Some(tier) => tier,
        None => return Ok(None),
    };
    let taken = seats.with_table(table, |parties| {
        let idx = if plate.reserved_for.is_some() {
            parties
                .iter()
                .position(|p| p.special_price == -(plate.price as i32))
                .or_else(|| parties.iter().position(|p| p.awaits_special()))
        } else {
            parties.iter().position(|p| p.claimed_total() < p.appetite)
        };
        let party = &mut parties[idx.or(if parties.is_empty() { None } else { Some(0) })?];
        party.claimed[tier] += 1;
        if plate.reserved_for.is_some() && party.awaits_special() {
            party.special_price = 0;
        } else if let Some(price) = order_special {
            if party.special_price == 0 && party.claimed_total() < party.appetite {
                party.special_price = price as i32;
            }
        }
        Some(party.id)
    })?;
    Ok(taken.flatten())
}

fn depart(arena: &Arena, seats: &SeatAllocator<'_>, table: u32, party_id: i32, why: &str) -> Result<()> {
    if let Some(party) = seats.remove(table, party_id)? {
        arena.sems().post(Sem::Hooks, party.size as u16)?;
        arena.write_counters(|c| c.departed += 1)?;
        info!(
            "party {} leaves table {} ({}): {} plates, bill {}",
            party.id,
            table,
            why,
            party.claimed_total(),
            party.bill()
        );
    }
    Ok(())
}

fn serve_table(
    arena: &Arena,
    cfg: &FacilityConfig,
    conveyor: &DeliveryConveyor,
    table_id: u32,
) -> Result<()> {
    let seats = SeatAllocator::new(arena);
    let mut rng = rand::thread_rng();
    let tick = Duration::from_millis((cfg.belt_tick_ms / 2).max(10));
    let dwell = cfg.party_dwell_ms as i64;

    while !arena.should_stop() {
        pause(arena, tick);
        let table = match seats.snapshot(table_id)? {
            Some(table) => table,
            None => return Ok(()),
        };
        if table.party_count == 0 {
            let gone = conveyor.discard_reserved(table_id)?;
            if !gone.is_empty() {
                info!("table {} empty, {} reserved plates taken off", table_id, gone.len());
                record_waste(arena, gone.len())?;
            }
            continue;
        }

        let hungry = table
            .seated()
            .iter()
            .any(|p| p.claimed_total() < p.appetite || p.awaits_special());
        if hungry {
            if let Some(plate) = conveyor.claim(table_id)? {
                let order = if rng.gen_range(0..100) < cfg.special_order_percent {
                    Some(PRICES[rng.gen_range(GENERIC_TIERS..TIER_COUNT)])
                } else {
                    None
                };
                match attribute(&seats, table_id, plate, order)? {
                    Some(_) => {
                        let tier = tier_of(plate.price).unwrap_or(0);
                        arena.write_counters(|c| c.sold[tier] += 1)?;
                    }
                    None => record_waste(arena, 1)?,
                }
            }
        }

        let now = now_millis();
        for party in table.seated() {
            if party.is_sated() {
                depart(arena, &seats, table_id, party.id, "finished")?;
            } else if now - party.seated_at > dwell {
                depart(arena, &seats, table_id, party.id, "gave up waiting for plates")?;
            }
        }
    }

    if let Some(table) = seats.snapshot(table_id)? {
        for party in table.seated() {
            depart(arena, &seats, table_id, party.id, "closing")?;
        }
    }
    record_waste(arena, conveyor.discard_reserved(table_id)?.len())?;
    Ok(())
}
