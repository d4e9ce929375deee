use std::error::Error;
use std::thread;
use std::time::Duration;

use kaiten::core::sem::Sem;
use kaiten::model::Party;
use kaiten::queue::BoundedPartyQueue;
use kaiten::roles::{run_kitchen, run_seating_service};
use kaiten::turns::{Phase, Role, TurnSequencer};
use kaiten::{logging, Arena, FacilityConfig};

fn main() -> Result<(), Box<dyn Error>> {
    println!("Starting in-process facility simulation...");
    let cfg = FacilityConfig {
        queue_capacity: 4,
        belt_tick_ms: 25,
        kitchen_cook_ms: 10,
        party_dwell_ms: 1_000,
        ..Default::default()
    };
    logging::init(&cfg.log_level);
    let arena = Arena::create(&cfg)?;

    let parties = 12;
    thread::scope(|s| -> Result<(), Box<dyn Error>> {
        let service = s.spawn(|| run_seating_service(&arena, &cfg));
        let kitchen = s.spawn(|| run_kitchen(&arena, &cfg));

        let queue = BoundedPartyQueue::new(&arena);
        for id in 0..parties {
            let adults = 1 + id as u32 % 2;
            let party = Party::new(id + 1, adults, id as u32 % 3, false, adults * 2);
            if !arena.sems().take_nowait(Sem::Hooks, party.size as u16)? {
                println!("[Main] cloakroom full, party {} turned away", party.id);
                continue;
            }
            queue.enqueue(&party)?;
            println!("[Main] party {} of {} queued", party.id, party.size);
            thread::sleep(Duration::from_millis(50));
        }
        thread::sleep(Duration::from_secs(2));
        arena.close();
        println!("[Main] facility closed");

        let turns = TurnSequencer::new(&arena);
        turns.advance(Role::Generator, Phase::Open)?;
        turns.await_phase(Phase::GeneratorExit)?;
        println!("[Main] generator done");
        turns.advance(Role::Generator, Phase::GeneratorExit)?;

        service.join().map_err(|_| "service panicked")??;
        kitchen.join().map_err(|_| "kitchen panicked")??;
        Ok(())
    })?;

    let counters = arena.read_counters()?;
    let hooks = arena.sems().value(Sem::Hooks)?;
    println!(
        "[Main] admitted {}, departed {}, abandoned {}, revenue {}, hooks {}/{}",
        counters.admitted,
        counters.departed,
        counters.abandoned,
        counters.revenue(),
        hooks,
        cfg.cloakroom_hooks
    );
    let ok = counters.admitted + counters.abandoned == parties as u64
        && counters.departed == counters.admitted
        && hooks == cfg.cloakroom_hooks as i32;
    if ok {
        println!("\nSimulation successful! Every party left and every hook came back.");
        Ok(())
    } else {
        eprintln!("\nSimulation failed. Counters do not balance.");
        Err(Box::new(std::io::Error::new(std::io::ErrorKind::Other, "Simulation failed")))
    }
}
