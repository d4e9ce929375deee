//! The arena: one shared-memory segment holding every piece of
//! cross-process state, plus the semaphore set and message queue that
//! guard and feed it.

pub mod event;
pub mod sem;
pub mod transport;

use std::env;
use std::mem::{self, ManuallyDrop};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use ::shared_memory::{Shmem, ShmemConf};
use tracing::{debug, warn};

use self::event::Notifier;
use self::sem::{Sem, SemaphoreSet, SEM_COUNT};
use self::transport::MessageQueue;
use crate::config::FacilityConfig;
use crate::errors::{KernelError, Result};
use crate::model::{table_layout, Counters, QueueState, Table, TABLE_COUNT};
use crate::turns::PHASE_COUNT;

pub const ARENA_MAGIC: u64 = u64::from_le_bytes(*b"KAITEN01");

pub const ENV_ARENA: &str = "KAITEN_ARENA";
pub const ENV_SEMSET: &str = "KAITEN_SEMSET";

#[repr(C)]
pub struct ArenaHeader {
    pub magic: u64,
    pub size: u64,
    pub msg_queue_id: i32,
    /// Written by the facility; read by every worker.
    pub open: AtomicU32,
    /// Written only through the turn sequencer.
    pub phase: AtomicU32,
    /// Written by the seating service at start-up; read by the supervisor.
    pub service_pid: AtomicI32,
    /// Last throughput signal the supervisor sent (0 none, 1 raise, 2 lower).
    pub speed_signal: AtomicI32,
}

#[repr(C)]
pub struct ArenaState {
    pub header: ArenaHeader,
    pub queue: QueueState,
    pub counters: Counters,
    pub tables: [Table; TABLE_COUNT],
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EventSlot {
    QueueNotFull,
    QueueNotEmpty,
    /// Fired once the phase token reaches the given phase.
    Phase(usize),
}

impl EventSlot {
    fn index(self) -> usize {
        match self {
            EventSlot::QueueNotFull => 0,
            EventSlot::QueueNotEmpty => 1,
            EventSlot::Phase(p) => 2 + p,
        }
    }

    fn auto_reset(index: usize) -> bool {
        index < 2
    }
}

pub const EVENT_COUNT: usize = 2 + PHASE_COUNT;

/// Byte offsets of every structure inside the segment. Creator and
/// attacher compute the same values from the same types.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ArenaLayout {
    pub state: usize,
    pub events: usize,
    pub event_stride: usize,
    pub total: usize,
}

impl ArenaLayout {
    pub fn compute() -> ArenaLayout {
        let state = 0;
        let events = (state + mem::size_of::<ArenaState>() + 63) & !63;
        let event_stride = Notifier::stride();
        ArenaLayout {
            state,
            events,
            event_stride,
            total: events + event_stride * EVENT_COUNT,
        }
    }

    pub fn event_offset(&self, slot: EventSlot) -> usize {
        self.events + slot.index() * self.event_stride
    }
}

/// What a child process needs to find the facility's arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaHandle {
    pub os_id: String,
    pub sem_id: i32,
}

impl ArenaHandle {
    pub fn from_env() -> Result<ArenaHandle> {
        let os_id = env::var(ENV_ARENA)
            .map_err(|_| KernelError::Config(format!("{} is not set", ENV_ARENA)))?;
        let sem_id = env::var(ENV_SEMSET)
            .map_err(|_| KernelError::Config(format!("{} is not set", ENV_SEMSET)))?
            .parse::<i32>()
            .map_err(|e| KernelError::Config(format!("{}: {}", ENV_SEMSET, e)))?;
        Ok(ArenaHandle { os_id, sem_id })
    }

    pub fn env_pairs(&self) -> [(&'static str, String); 2] {
        [
            (ENV_ARENA, self.os_id.clone()),
            (ENV_SEMSET, self.sem_id.to_string()),
        ]
    }
}

pub struct Arena {
    shmem: Shmem,
    layout: ArenaLayout,
    sems: SemaphoreSet,
    transport: MessageQueue,
    events: ManuallyDrop<Vec<Notifier>>,
    owner: bool,
    halted: Arc<AtomicBool>,
}

// The segment is mapped MAP_SHARED and every mutable region is reached
// either through atomics or under a SysV semaphore; the events are
// process-shared pthread objects.
unsafe impl Send for Arena {}
unsafe impl Sync for Arena {}

impl Arena {
    /// Creates and zero-initializes a fresh arena, its semaphore set and
    /// its message queue. The returned arena owns their teardown.
    pub fn create(cfg: &FacilityConfig) -> Result<Arena> {
        let layout = ArenaLayout::compute();
        let mut shmem = ShmemConf::new().size(layout.total).create()?;
        shmem.set_owner(true);
        let base = shmem.as_ptr();
        unsafe { ptr::write_bytes(base, 0, layout.total) };

        let mut initial = [0i32; SEM_COUNT];
        initial[Sem::Tables as usize] = 1;
        initial[Sem::Queue as usize] = 1;
        initial[Sem::Counters as usize] = 1;
        initial[Sem::Hooks as usize] = cfg.cloakroom_hooks as i32;
        initial[Sem::Pass as usize] = 0;
        let sems = SemaphoreSet::create(initial)?;
        let transport = match MessageQueue::create() {
            Ok(t) => t,
            Err(e) => {
                let _ = sems.remove();
                return Err(e);
            }
        };

        let mut events = Vec::with_capacity(EVENT_COUNT);
        for index in 0..EVENT_COUNT {
            let mem = unsafe { base.add(layout.events + index * layout.event_stride) };
            match unsafe { Notifier::init(mem, EventSlot::auto_reset(index)) } {
                Ok(n) => events.push(n),
                Err(e) => {
                    let _ = sems.remove();
                    let _ = transport.remove();
                    return Err(e);
                }
            }
        }

        let state = base as *mut ArenaState;
        unsafe {
            let header = ptr::addr_of_mut!((*state).header);
            (*header).magic = ARENA_MAGIC;
            (*header).size = layout.total as u64;
            (*header).msg_queue_id = transport.id();
            (*header).open.store(1, Ordering::SeqCst);
            (*state).tables = table_layout();
            (*state).queue.capacity = cfg.queue_capacity;
        }
        debug!(
            "arena created: os_id={} size={} semset={} msgq={}",
            shmem.get_os_id(),
            layout.total,
            sems.id(),
            transport.id()
        );

        Ok(Arena {
            shmem,
            layout,
            sems,
            transport,
            events: ManuallyDrop::new(events),
            owner: true,
            halted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Maps an existing arena. Recomputes offsets only; nothing in the
    /// segment is written.
    pub fn attach(handle: &ArenaHandle) -> Result<Arena> {
        let layout = ArenaLayout::compute();
        let shmem = ShmemConf::new().os_id(&handle.os_id).open()?;
        if shmem.len() < layout.total {
            return Err(KernelError::Layout(format!(
                "segment is {} bytes, layout needs {}",
                shmem.len(),
                layout.total
            )));
        }
        let base = shmem.as_ptr();
        let header = unsafe { &*(base as *const ArenaHeader) };
        if header.magic != ARENA_MAGIC || header.size != layout.total as u64 {
            return Err(KernelError::Layout(format!(
                "magic {:#x} / size {} do not match this build",
                header.magic, header.size
            )));
        }
        let transport = MessageQueue::attach(header.msg_queue_id);
        let mut events = Vec::with_capacity(EVENT_COUNT);
        for index in 0..EVENT_COUNT {
            let mem = unsafe { base.add(layout.events + index * layout.event_stride) };
            events.push(unsafe { Notifier::existing(mem)? });
        }
        Ok(Arena {
            shmem,
            layout,
            sems: SemaphoreSet::attach(handle.sem_id),
            transport,
            events: ManuallyDrop::new(events),
            owner: false,
            halted: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn handle(&self) -> ArenaHandle {
        ArenaHandle {
            os_id: self.shmem.get_os_id().to_string(),
            sem_id: self.sems.id(),
        }
    }

    pub fn layout(&self) -> &ArenaLayout {
        &self.layout
    }

    pub fn is_owner(&self) -> bool {
        self.owner
    }

    fn state(&self) -> *mut ArenaState {
        unsafe { self.shmem.as_ptr().add(self.layout.state) as *mut ArenaState }
    }

    pub fn header(&self) -> &ArenaHeader {
        unsafe { &*ptr::addr_of!((*self.state()).header) }
    }

    pub fn sems(&self) -> &SemaphoreSet {
        &self.sems
    }

    pub fn transport(&self) -> &MessageQueue {
        &self.transport
    }

    pub fn notifier(&self, slot: EventSlot) -> &Notifier {
        &self.events[slot.index()]
    }

    pub fn is_open(&self) -> bool {
        self.header().open.load(Ordering::SeqCst) == 1
    }

    /// Clears the open flag and wakes every parked queue waiter so each
    /// observes the close within one re-check interval.
    pub fn close(&self) {
        if self.header().open.swap(0, Ordering::SeqCst) == 1 {
            for slot in [EventSlot::QueueNotFull, EventSlot::QueueNotEmpty] {
                if let Err(e) = self.notifier(slot).notify() {
                    warn!("waking {:?} waiters failed: {}", slot, e);
                }
            }
        }
    }

    /// Process-local flag set by SIGTERM.
    pub fn halt_flag(&self) -> Arc<AtomicBool> {
        self.halted.clone()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Blocking waits give up once this is true.
    pub fn should_stop(&self) -> bool {
        !self.is_open() || self.is_halted()
    }

    pub fn service_pid(&self) -> i32 {
        self.header().service_pid.load(Ordering::SeqCst)
    }

    pub fn set_service_pid(&self, pid: i32) {
        self.header().service_pid.store(pid, Ordering::SeqCst)
    }

    pub fn write_tables<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut [Table; TABLE_COUNT]) -> R,
    {
        let _guard = self.sems.lock(Sem::Tables)?;
        let tables = unsafe { &mut *ptr::addr_of_mut!((*self.state()).tables) };
        Ok(f(tables))
    }

    pub fn read_tables<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&[Table; TABLE_COUNT]) -> R,
    {
        let _guard = self.sems.lock(Sem::Tables)?;
        let tables = unsafe { &*ptr::addr_of!((*self.state()).tables) };
        Ok(f(tables))
    }

    pub fn write_counters<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Counters) -> R,
    {
        let _guard = self.sems.lock(Sem::Counters)?;
        let counters = unsafe { &mut *ptr::addr_of_mut!((*self.state()).counters) };
        Ok(f(counters))
    }

    pub fn read_counters(&self) -> Result<Counters> {
        let _guard = self.sems.lock(Sem::Counters)?;
        Ok(unsafe { ptr::addr_of!((*self.state()).counters).read() })
    }

    pub fn write_queue<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut QueueState) -> R,
    {
        let _guard = self.sems.lock(Sem::Queue)?;
        let queue = unsafe { &mut *ptr::addr_of_mut!((*self.state()).queue) };
        Ok(f(queue))
    }

    pub fn read_queue(&self) -> Result<QueueState> {
        let _guard = self.sems.lock(Sem::Queue)?;
        Ok(unsafe { ptr::addr_of!((*self.state()).queue).read() })
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        if !self.owner {
            return;
        }
        if let Err(e) = self.sems.remove() {
            warn!("removing semaphore set failed: {}", e);
        }
        if let Err(e) = self.transport.remove() {
            warn!("removing message queue failed: {}", e);
        }
        unsafe { ManuallyDrop::drop(&mut self.events) };
    }
}
