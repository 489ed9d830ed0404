//! Adapters Layer
//!
//! Concrete implementations of the port traits:
//! - `InMemoryStore` - reference `DocumentStore` with change feeds and fault injection
//! - `JsonCodec` - `PayloadCodec` over serde_json
//! - `connect_store` - URI-based store resolution

pub mod connect;
pub mod json_codec;
pub mod memory_store;

pub use connect::{connect_store, shared_memory_store, StoreUri};
pub use json_codec::JsonCodec;
pub use memory_store::{InMemoryDatabase, InMemoryStore, DEFAULT_FEED_CAPACITY};
