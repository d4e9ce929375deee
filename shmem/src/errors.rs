use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KernelError>;

#[derive(Debug, Error)]
pub enum KernelError {
    /// The arena, a semaphore set or the message queue was removed. This is
    /// the normal end-of-run race, not a fault.
    #[error("IPC object no longer exists; the facility has torn down")]
    Destroyed,
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] shared_memory::ShmemError),
    // raw_sync hands back `Box<dyn Error>` which is neither Send nor Sync.
    #[error("Event error: {0}")]
    Event(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Signal handling error: {0}")]
    SignalHook(#[source] io::Error),
    #[error("Arena layout mismatch: {0}")]
    Layout(String),
    #[error("Turn protocol violation: {0}")]
    Turn(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Configuration could not be loaded: {0}")]
    ConfigLoad(#[from] confy::ConfyError),
    #[error("Worker thread panicked: {0}")]
    WorkerPanic(String),
    #[error("Mutex was poisoned")]
    PoisonedLock,
}

impl KernelError {
    pub fn is_destroyed(&self) -> bool {
        matches!(self, KernelError::Destroyed)
    }

    /// Classifies the errno left behind by a failed SysV call.
    pub(crate) fn from_errno(err: io::Error) -> KernelError {
        match err.raw_os_error() {
            Some(libc::EIDRM) | Some(libc::EINVAL) => KernelError::Destroyed,
            _ => KernelError::Io(err),
        }
    }

    pub(crate) fn event(err: Box<dyn std::error::Error>) -> KernelError {
        KernelError::Event(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for KernelError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        KernelError::PoisonedLock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_identifiers_map_to_destroyed() {
        let err = KernelError::from_errno(io::Error::from_raw_os_error(libc::EIDRM));
        assert!(err.is_destroyed());
        let err = KernelError::from_errno(io::Error::from_raw_os_error(libc::EINVAL));
        assert!(err.is_destroyed());
    }

    #[test]
    fn other_errno_is_fatal_io() {
        let err = KernelError::from_errno(io::Error::from_raw_os_error(libc::EACCES));
        assert!(!err.is_destroyed());
        assert!(matches!(err, KernelError::Io(_)));
    }
}
