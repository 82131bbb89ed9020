//! Daemon and cli for tracking which application and window hold your
//! attention throughout the day. Activity is recorded as sessions in a local
//! SQLite file and queried straight from a terminal, no runtimes attached.
//!

pub mod cli;
pub mod daemon;
pub mod exclusion;
pub mod utils;
pub mod window_api;
