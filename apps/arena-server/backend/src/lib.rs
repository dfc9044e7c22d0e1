//! Race-free vote tallying for two-option battles.
//!
//! A vote is accepted at most once per (battle, voter), only while the battle
//! is open, and the cached counts move in the same atomic step as the vote
//! ledger. See [`store`] for the storage contract and [`vote`] for the casting
//! flow.

pub mod app;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
mod identity;
pub mod log;
pub mod memory;
pub mod rewards;
pub mod seed;
pub mod state;
pub mod store;
pub mod vote;

pub use error::{Error, Result};
