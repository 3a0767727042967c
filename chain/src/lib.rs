pub mod config;
pub mod store;

pub use config::{NetworkKind, NetworkParams};
pub use store::{ChainStore, MemoryStore};
