//! Spawning and reaping of worker processes.

pub mod signals;

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Child, Command};

use tracing::{debug, warn};

use crate::core::{Arena, ArenaHandle};
use crate::errors::Result;
use crate::turns::Role;

/// Builds the command line for a worker process: the program, the fixed
/// arguments every worker gets, the role subcommand and the arena handle.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    program: PathBuf,
    base_args: Vec<OsString>,
    handle: ArenaHandle,
}

pub const ARRIVAL_SUBCOMMAND: &str = "arrival";

pub fn role_subcommand(role: Role) -> &'static str {
    match role {
        Role::Generator => ARRIVAL_SUBCOMMAND,
        Role::Service => "service",
        Role::Kitchen => "kitchen",
        Role::Supervisor => "supervisor",
        Role::Cloakroom => "cloakroom",
    }
}

impl WorkerLauncher {
    pub fn new<P: Into<PathBuf>>(program: P, base_args: Vec<OsString>, handle: ArenaHandle) -> WorkerLauncher {
        WorkerLauncher {
            program: program.into(),
            base_args,
            handle,
        }
    }

    pub fn command(&self, subcommand: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.base_args);
        if !subcommand.is_empty() {
            cmd.arg(subcommand);
        }
        for (key, value) in self.handle.env_pairs().iter() {
            cmd.env(key, value);
        }
        cmd
    }

    pub fn spawn(&self, subcommand: &str) -> Result<Child> {
        Ok(self.command(subcommand).spawn()?)
    }
}

pub struct ProcessSupervisor<'a> {
    arena: &'a Arena,
    launcher: WorkerLauncher,
    arrival_subcommand: String,
    workers: Vec<Child>,
}

impl<'a> ProcessSupervisor<'a> {
    pub fn new(arena: &'a Arena, launcher: WorkerLauncher) -> ProcessSupervisor<'a> {
        ProcessSupervisor {
            arena,
            launcher,
            arrival_subcommand: ARRIVAL_SUBCOMMAND.to_string(),
            workers: Vec::new(),
        }
    }

    /// Overrides the subcommand passed to arrival workers.
    pub fn with_arrival_subcommand(mut self, subcommand: &str) -> Self {
        self.arrival_subcommand = subcommand.to_string();
        self
    }

    pub fn tracked(&self) -> usize {
        self.workers.len()
    }

    pub fn active_workers(&self) -> Result<u32> {
        Ok(self.arena.read_queue()?.active_workers)
    }

    /// Starts one arrival worker and counts it under the queue lock.
    pub fn spawn_arrival_worker(&mut self) -> Result<u32> {
        let child = self.launcher.spawn(&self.arrival_subcommand)?;
        let pid = child.id();
        self.workers.push(child);
        self.arena.write_queue(|q| q.active_workers += 1)?;
        debug!("arrival worker {} started", pid);
        Ok(pid)
    }

    /// Collects every finished worker; with `blocking` waits for all of
    /// them. Returns how many were reaped.
    pub fn reap(&mut self, blocking: bool) -> Result<usize> {
        let mut reaped = 0usize;
        let mut still_running = Vec::with_capacity(self.workers.len());
        for mut child in self.workers.drain(..) {
            let status = if blocking {
                child.wait().map(Some)
            } else {
                child.try_wait()
            };
            match status {
                Ok(Some(status)) => {
                    if !status.success() {
                        warn!("arrival worker {} exited with {}", child.id(), status);
                    }
                    reaped += 1;
                }
                Ok(None) => still_running.push(child),
                Err(e) => {
                    warn!("waiting on worker {} failed: {}", child.id(), e);
                    reaped += 1;
                }
            }
        }
        self.workers = still_running;
        if reaped > 0 {
            self.arena.write_queue(|q| {
                q.active_workers = q.active_workers.saturating_sub(reaped as u32);
            })?;
        }
        Ok(reaped)
    }
}
