pub use arena_server_client::{Client, Error, Result};
