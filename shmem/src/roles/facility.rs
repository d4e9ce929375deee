use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{info, info_span, warn};

use crate::config::FacilityConfig;
use crate::core::Arena;
use crate::errors::Result;
use crate::supervisor::signals::{self, install_facility_signals};
use crate::supervisor::{role_subcommand, ProcessSupervisor, WorkerLauncher};
use crate::turns::{Phase, Role, TurnSequencer};

const LONG_LIVED: [Role; 4] = [Role::Service, Role::Kitchen, Role::Supervisor, Role::Cloakroom];
const STEP: Duration = Duration::from_millis(20);

/// The long-lived role processes, in start order.
struct RoleProcesses {
    children: Vec<(Role, Child)>,
}

impl RoleProcesses {
    fn start(launcher: &WorkerLauncher) -> Result<RoleProcesses> {
        let mut roles = RoleProcesses {
            children: Vec::with_capacity(LONG_LIVED.len()),
        };
        for role in LONG_LIVED {
            match launcher.spawn(role_subcommand(role)) {
                Ok(child) => {
                    info!("{} started as pid {}", role, child.id());
                    roles.children.push((role, child));
                }
                Err(e) => {
                    roles.terminate();
                    roles.wait_all();
                    return Err(e);
                }
            }
        }
        Ok(roles)
    }

    /// True once the service or the kitchen is gone. Without them the
    /// phases can never finish.
    fn core_exited(&mut self) -> bool {
        self.children
            .iter_mut()
            .filter(|(role, _)| matches!(role, Role::Service | Role::Kitchen))
            .any(|(role, child)| match child.try_wait() {
                Ok(Some(status)) => {
                    warn!("{} exited early with {}", role, status);
                    true
                }
                Ok(None) => false,
                Err(_) => true,
            })
    }

    fn terminate(&self) {
        for (_, child) in self.children.iter() {
            signals::send(child.id() as i32, libc::SIGTERM);
        }
    }

    fn wait_all(&mut self) {
        for (role, mut child) in self.children.drain(..) {
            match child.wait() {
                Ok(status) if status.success() => info!("{} finished", role),
                Ok(status) => warn!("{} finished with {}", role, status),
                Err(e) => warn!("waiting on {} failed: {}", role, e),
            }
        }
    }
}

/// Sleeps up to `period`, cut short by `stop` or the deadline.
fn nap(period: Duration, stop: &AtomicBool, deadline: Option<Instant>) {
    let until = Instant::now() + period;
    loop {
        let now = Instant::now();
        if now >= until || stop.load(Ordering::SeqCst) || deadline.map_or(false, |d| now >= d) {
            return;
        }
        thread::sleep(STEP.min(until - now));
    }
}

/// Runs the whole facility: creates the arena, starts the role processes,
/// keeps arrival workers coming until close, then drives the closing
/// phases and tears everything down.
///
/// `program` and `base_args` describe how to re-invoke this binary; the
/// role name is appended as a subcommand for every child.
pub fn run_facility(cfg: &FacilityConfig, program: PathBuf, base_args: Vec<OsString>) -> Result<()> {
    let span = info_span!("facility");
    let _entered = span.enter();

    let stop = install_facility_signals()?;
    let arena = Arena::create(cfg)?;
    let launcher = WorkerLauncher::new(program, base_args, arena.handle());
    let mut roles = RoleProcesses::start(&launcher)?;
    let mut workers = ProcessSupervisor::new(&arena, launcher);

    let result = generate(&arena, cfg, &stop, &mut roles, &mut workers)
        .and_then(|()| close_down(&arena, &mut roles));
    if result.is_err() {
        arena.close();
        roles.terminate();
        if let Err(e) = workers.reap(true) {
            warn!("reaping arrival workers failed: {}", e);
        }
    }
    roles.wait_all();
    info!("facility closed");
    result
}

fn generate(
    arena: &Arena,
    cfg: &FacilityConfig,
    stop: &AtomicBool,
    roles: &mut RoleProcesses,
    workers: &mut ProcessSupervisor<'_>,
) -> Result<()> {
    let deadline = if cfg.run_seconds > 0 {
        Some(Instant::now() + Duration::from_secs(cfg.run_seconds))
    } else {
        None
    };
    let mut rng = rand::thread_rng();
    info!("facility open");

    loop {
        if stop.load(Ordering::SeqCst) {
            info!("close requested by signal");
            break;
        }
        if deadline.map_or(false, |d| Instant::now() >= d) {
            info!("closing time");
            break;
        }
        if roles.core_exited() {
            warn!("closing early, a role process is gone");
            break;
        }
        workers.reap(false)?;
        if workers.active_workers()? < cfg.max_active_workers {
            if let Err(e) = workers.spawn_arrival_worker() {
                warn!("could not start an arrival worker: {}", e);
            }
        }
        let wait = rng.gen_range(cfg.spawn_interval_min_ms..=cfg.spawn_interval_max_ms);
        nap(Duration::from_millis(wait), stop, deadline);
    }

    arena.close();
    let reaped = workers.reap(true)?;
    info!("doors shut, {} arrival workers reaped", reaped);
    Ok(())
}

fn close_down(arena: &Arena, roles: &mut RoleProcesses) -> Result<()> {
    let turns = TurnSequencer::new(arena);
    turns.advance(Role::Generator, Phase::Open)?;
    if !turns.await_phase_until(Phase::GeneratorExit, || roles.core_exited())? {
        warn!("summaries never finished, stopping the remaining roles");
        roles.terminate();
        return Ok(());
    }
    info!("generator done");
    turns.advance(Role::Generator, Phase::GeneratorExit)?;
    Ok(())
}
