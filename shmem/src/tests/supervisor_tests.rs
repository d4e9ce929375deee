use std::ffi::OsString;

use super::{setup_arena, small_config, TestResult};
use crate::supervisor::{role_subcommand, ProcessSupervisor, WorkerLauncher, ARRIVAL_SUBCOMMAND};
use crate::turns::Role;

fn sh(script: &str) -> Vec<OsString> {
    vec!["-c".into(), script.into()]
}

#[test]
fn spawned_workers_are_counted_and_reaped() -> TestResult {
    let arena = setup_arena(&small_config())?;
    let launcher = WorkerLauncher::new("true", Vec::new(), arena.handle());
    let mut workers = ProcessSupervisor::new(&arena, launcher);
    for _ in 0..3 {
        workers.spawn_arrival_worker()?;
    }
    assert_eq!(workers.active_workers()?, 3);
    assert_eq!(workers.tracked(), 3);

    assert_eq!(workers.reap(true)?, 3);
    assert_eq!(workers.active_workers()?, 0);
    assert_eq!(workers.tracked(), 0);
    assert_eq!(workers.reap(false)?, 0);
    Ok(())
}

#[test]
fn failed_worker_is_still_reaped() -> TestResult {
    let arena = setup_arena(&small_config())?;
    let launcher = WorkerLauncher::new("sh", sh("exit 3"), arena.handle());
    let mut workers = ProcessSupervisor::new(&arena, launcher);
    workers.spawn_arrival_worker()?;
    assert_eq!(workers.reap(true)?, 1);
    assert_eq!(workers.active_workers()?, 0);
    Ok(())
}

#[test]
fn non_blocking_reap_leaves_running_workers() -> TestResult {
    let arena = setup_arena(&small_config())?;
    let launcher = WorkerLauncher::new("sleep", Vec::new(), arena.handle());
    let mut workers = ProcessSupervisor::new(&arena, launcher).with_arrival_subcommand("1");
    workers.spawn_arrival_worker()?;
    assert_eq!(workers.reap(false)?, 0);
    assert_eq!(workers.active_workers()?, 1);
    assert_eq!(workers.reap(true)?, 1);
    assert_eq!(workers.active_workers()?, 0);
    Ok(())
}

#[test]
fn children_inherit_the_arena_handle() -> TestResult {
    let arena = setup_arena(&small_config())?;
    let handle = arena.handle();
    let script = format!(
        "test \"$KAITEN_ARENA\" = \"{}\" && test \"$KAITEN_SEMSET\" = \"{}\"",
        handle.os_id, handle.sem_id
    );
    let launcher = WorkerLauncher::new("sh", sh(&script), handle);
    let status = launcher.command("").status()?;
    assert!(status.success());
    Ok(())
}

#[test]
fn role_subcommands_are_distinct() {
    let roles = [Role::Generator, Role::Service, Role::Kitchen, Role::Supervisor, Role::Cloakroom];
    let mut names: Vec<_> = roles.iter().map(|r| role_subcommand(*r)).collect();
    assert_eq!(names[0], ARRIVAL_SUBCOMMAND);
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), roles.len());
}
