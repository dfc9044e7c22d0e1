//! Types shared between the arena server, its client library, and any other
//! consumer of the arena HTTP API.

pub mod arena;
