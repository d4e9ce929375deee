//! SysV message queue carrying fixed-size `Party` records.

use std::io;
use std::mem;

use crate::errors::{KernelError, Result};
use crate::model::Party;

const PARTY_MTYPE: libc::c_long = 1;

#[repr(C)]
struct PartyMessage {
    mtype: libc::c_long,
    party: Party,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// The kernel queue has no room; try again later.
    Full,
}

#[derive(Debug)]
pub struct MessageQueue {
    id: libc::c_int,
}

impl MessageQueue {
    pub fn create() -> Result<MessageQueue> {
        let id = unsafe { libc::msgget(libc::IPC_PRIVATE, libc::IPC_CREAT | libc::IPC_EXCL | 0o600) };
        if id < 0 {
            return Err(KernelError::Io(io::Error::last_os_error()));
        }
        Ok(MessageQueue { id })
    }

    pub fn attach(id: i32) -> MessageQueue {
        MessageQueue { id }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn try_send(&self, party: &Party) -> Result<SendOutcome> {
        let msg = PartyMessage {
            mtype: PARTY_MTYPE,
            party: *party,
        };
        loop {
            let rc = unsafe {
                libc::msgsnd(
                    self.id,
                    &msg as *const PartyMessage as *const libc::c_void,
                    mem::size_of::<Party>(),
                    libc::IPC_NOWAIT,
                )
            };
            if rc == 0 {
                return Ok(SendOutcome::Sent);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EAGAIN) => return Ok(SendOutcome::Full),
                _ => return Err(KernelError::from_errno(err)),
            }
        }
    }

    pub fn try_recv(&self) -> Result<Option<Party>> {
        let mut msg = PartyMessage {
            mtype: 0,
            party: Party::default(),
        };
        loop {
            let rc = unsafe {
                libc::msgrcv(
                    self.id,
                    &mut msg as *mut PartyMessage as *mut libc::c_void,
                    mem::size_of::<Party>(),
                    PARTY_MTYPE,
                    libc::IPC_NOWAIT,
                )
            };
            if rc >= 0 {
                return Ok(Some(msg.party));
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ENOMSG) => return Ok(None),
                _ => return Err(KernelError::from_errno(err)),
            }
        }
    }

    pub fn remove(&self) -> Result<()> {
        let rc = unsafe { libc::msgctl(self.id, libc::IPC_RMID, std::ptr::null_mut()) };
        if rc < 0 {
            return Err(KernelError::from_errno(io::Error::last_os_error()));
        }
        Ok(())
    }
}
