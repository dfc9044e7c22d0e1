//! Typed HTTP client for the arena server.

mod client;
mod result;

pub use client::Client;
pub use result::{Error, Result};
