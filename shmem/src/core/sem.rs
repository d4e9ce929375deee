//! SysV counting semaphores.
//!
//! Lock acquisitions carry `SEM_UNDO` so the kernel gives the unit back if
//! the holder dies. Counting resources that are handed from one process to
//! another (coat hooks, plates at the pass) go through `take_nowait`/`post`
//! without undo, since the process that takes them is not the one that
//! returns them.

use std::io;

use tracing::warn;

use crate::errors::{KernelError, Result};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum Sem {
    Tables = 0,
    Queue = 1,
    Counters = 2,
    Hooks = 3,
    Pass = 4,
}

pub const SEM_COUNT: usize = 5;

#[derive(Debug)]
pub struct SemaphoreSet {
    id: libc::c_int,
}

pub struct SemGuard<'a> {
    set: &'a SemaphoreSet,
    sem: Sem,
}

impl Drop for SemGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.set.op(self.sem, 1, libc::SEM_UNDO) {
            if !e.is_destroyed() {
                warn!("releasing {:?} failed: {}", self.sem, e);
            }
        }
    }
}

impl SemaphoreSet {
    /// Creates a private set; `initial` gives the starting value per `Sem`.
    pub fn create(initial: [i32; SEM_COUNT]) -> Result<SemaphoreSet> {
        let id = unsafe {
            libc::semget(
                libc::IPC_PRIVATE,
                SEM_COUNT as libc::c_int,
                libc::IPC_CREAT | libc::IPC_EXCL | 0o600,
            )
        };
        if id < 0 {
            return Err(KernelError::Io(io::Error::last_os_error()));
        }
        let set = SemaphoreSet { id };
        for (num, value) in initial.iter().enumerate() {
            let rc = unsafe { libc::semctl(id, num as libc::c_int, libc::SETVAL, *value) };
            if rc < 0 {
                let err = io::Error::last_os_error();
                let _ = set.remove();
                return Err(KernelError::Io(err));
            }
        }
        Ok(set)
    }

    pub fn attach(id: i32) -> SemaphoreSet {
        SemaphoreSet { id }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    fn op(&self, sem: Sem, delta: i16, flags: libc::c_int) -> Result<()> {
        let mut buf = libc::sembuf {
            sem_num: sem as libc::c_ushort,
            sem_op: delta as libc::c_short,
            sem_flg: flags as libc::c_short,
        };
        loop {
            let rc = unsafe { libc::semop(self.id, &mut buf, 1) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                _ => return Err(KernelError::from_errno(err)),
            }
        }
    }

    pub fn lock(&self, sem: Sem) -> Result<SemGuard<'_>> {
        self.op(sem, -1, libc::SEM_UNDO)?;
        Ok(SemGuard { set: self, sem })
    }

    /// Takes `n` units if they are available right now.
    pub fn take_nowait(&self, sem: Sem, n: u16) -> Result<bool> {
        match self.op(sem, -(n as i16), libc::IPC_NOWAIT) {
            Ok(()) => Ok(true),
            Err(KernelError::Io(e)) if e.raw_os_error() == Some(libc::EAGAIN) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn post(&self, sem: Sem, n: u16) -> Result<()> {
        self.op(sem, n as i16, 0)
    }

    pub fn value(&self, sem: Sem) -> Result<i32> {
        let rc = unsafe { libc::semctl(self.id, sem as libc::c_int, libc::GETVAL) };
        if rc < 0 {
            return Err(KernelError::from_errno(io::Error::last_os_error()));
        }
        Ok(rc)
    }

    pub fn remove(&self) -> Result<()> {
        let rc = unsafe { libc::semctl(self.id, 0, libc::IPC_RMID) };
        if rc < 0 {
            return Err(KernelError::from_errno(io::Error::last_os_error()));
        }
        Ok(())
    }
}
