pub mod config;
pub mod conveyor;
pub mod core;
pub mod errors;
pub mod logging;
pub mod model;
pub mod queue;
pub mod roles;
pub mod seating;
pub mod supervisor;
pub mod turns;

#[cfg(test)]
mod tests;

pub use crate::config::FacilityConfig;
pub use crate::core::{Arena, ArenaHandle};
pub use crate::errors::{KernelError, Result};

pub const TABLE_COUNT: usize = model::TABLE_COUNT;
pub const MAX_PARTY_SIZE: u32 = model::MAX_PARTY_SIZE;
