// src/lib.rs

pub mod bridge;
pub mod db;
pub mod eventbus;
pub mod repositories;
pub mod sessions;
pub mod state;
pub mod supervisor;
pub mod test_utils;
pub mod timers;
pub mod utils;

pub use afkbot_common::error::Error;
pub use db::Database;
pub use supervisor::{ConnectionSupervisor, SupervisorConfig};
