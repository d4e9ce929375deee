use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::{checked_in, setup_arena, small_config, TestResult};
use crate::core::Arena;
use crate::queue::BoundedPartyQueue;

#[test]
fn parties_come_out_in_order_and_intact() -> TestResult {
    let arena = setup_arena(&small_config())?;
    let queue = BoundedPartyQueue::new(&arena);
    let first = checked_in(&arena, 1, 2, 1)?;
    let second = checked_in(&arena, 2, 1, 0)?;
    assert!(queue.enqueue(&first)?);
    assert!(queue.enqueue(&second)?);
    assert_eq!(queue.occupancy()?, 2);
    assert_eq!(arena.read_queue()?.waiting_headcount, 4);

    let out = queue.dequeue()?.expect("first party");
    assert!(out.same_identity(&first));
    let out = queue.try_dequeue()?.expect("second party");
    assert!(out.same_identity(&second));
    assert_eq!(queue.occupancy()?, 0);
    assert_eq!(arena.read_queue()?.waiting_headcount, 0);
    assert!(queue.try_dequeue()?.is_none());
    Ok(())
}

#[test]
fn full_queue_holds_producers_back() -> TestResult {
    let cfg = small_config();
    let arena = setup_arena(&cfg)?;
    let queue = BoundedPartyQueue::new(&arena);
    assert_eq!(queue.capacity()?, cfg.queue_capacity);
    for id in 0..cfg.queue_capacity as i32 {
        assert!(queue.enqueue(&checked_in(&arena, id, 1, 0)?)?);
    }
    let late = checked_in(&arena, 99, 1, 0)?;
    let queued = AtomicBool::new(false);

    thread::scope(|s| -> TestResult {
        let producer = s.spawn(|| {
            let ok = BoundedPartyQueue::new(&arena).enqueue(&late);
            queued.store(true, Ordering::SeqCst);
            ok
        });
        thread::sleep(Duration::from_millis(200));
        assert!(!queued.load(Ordering::SeqCst));
        assert_eq!(queue.occupancy()?, cfg.queue_capacity);

        assert!(queue.dequeue()?.is_some());
        let sent = producer.join().map_err(|_| "producer panicked")?;
        assert!(sent?);
        Ok(())
    })?;
    assert!(queued.load(Ordering::SeqCst));
    assert_eq!(queue.occupancy()?, cfg.queue_capacity);
    Ok(())
}

#[test]
fn occupancy_never_exceeds_capacity() -> TestResult {
    let cfg = small_config();
    let arena = Arc::new(setup_arena(&cfg)?);
    let producers: Vec<_> = (0..4)
        .map(|t| {
            let arena = arena.clone();
            thread::spawn(move || -> Result<(), String> {
                let queue = BoundedPartyQueue::new(&arena);
                for i in 0..10 {
                    let party = super::checked_in(&arena, t * 100 + i, 1, 0).map_err(|e| e.to_string())?;
                    queue.enqueue(&party).map_err(|e| e.to_string())?;
                }
                Ok(())
            })
        })
        .collect();

    let queue = BoundedPartyQueue::new(&arena);
    let mut taken = 0;
    while taken < 40 {
        assert!(queue.occupancy()? <= cfg.queue_capacity);
        if queue.dequeue()?.is_some() {
            taken += 1;
            arena.sems().post(crate::core::sem::Sem::Hooks, 1)?;
        }
    }
    for producer in producers {
        producer.join().map_err(|_| "producer panicked")??;
    }
    assert_eq!(queue.occupancy()?, 0);
    Ok(())
}

fn blocked_until_close<F>(arena: &Arena, blocked: F) -> TestResult<Duration>
where
    F: FnOnce() -> bool + Send,
{
    thread::scope(|s| -> TestResult<Duration> {
        let waiter = s.spawn(move || {
            let start = Instant::now();
            (blocked(), start.elapsed())
        });
        thread::sleep(Duration::from_millis(150));
        arena.close();
        let (handed_over, waited) = waiter.join().map_err(|_| "waiter panicked")?;
        assert!(!handed_over);
        Ok(waited)
    })
}

#[test]
fn close_releases_a_parked_consumer() -> TestResult {
    let arena = setup_arena(&small_config())?;
    let waited = blocked_until_close(&arena, || {
        BoundedPartyQueue::new(&arena).dequeue().map(|p| p.is_some()).unwrap_or(true)
    })?;
    assert!(waited < Duration::from_secs(3), "consumer waited {:?}", waited);
    Ok(())
}

#[test]
fn close_releases_a_parked_producer() -> TestResult {
    let cfg = small_config();
    let arena = setup_arena(&cfg)?;
    let queue = BoundedPartyQueue::new(&arena);
    for id in 0..cfg.queue_capacity as i32 {
        assert!(queue.enqueue(&checked_in(&arena, id, 1, 0)?)?);
    }
    let late = checked_in(&arena, 42, 2, 0)?;
    let waited = blocked_until_close(&arena, || {
        BoundedPartyQueue::new(&arena).enqueue(&late).unwrap_or(true)
    })?;
    assert!(waited < Duration::from_secs(3), "producer waited {:?}", waited);
    assert_eq!(queue.occupancy()?, cfg.queue_capacity);

    // after close the queue can still be drained without blocking
    let mut drained = 0;
    while queue.try_dequeue()?.is_some() {
        drained += 1;
    }
    assert_eq!(drained, cfg.queue_capacity);
    assert!(queue.dequeue()?.is_none());
    Ok(())
}
