//! Persistence layer for sync state

mod connection;
mod migrations;
mod state_repository;

pub use connection::Database;
pub use state_repository::{
    load_json, save_json, LibSqlStateRepository, MemoryStateRepository, StateKey,
    StateRepository,
};
