//! Store URI resolution.
//!
//! `memory://<name>` resolves to a process-wide named [`InMemoryStore`]:
//! every client connecting to the same name shares one store, the way
//! separate processes share one database server.

use super::memory_store::InMemoryStore;
use crate::error::{BrokerError, BrokerResult};
use crate::ports::DocumentStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

const MEMORY_SCHEME: &str = "memory://";

/// A parsed store location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUri {
    Memory { name: String },
}

impl FromStr for StoreUri {
    type Err = BrokerError;

    fn from_str(uri: &str) -> Result<Self, Self::Err> {
        match uri.strip_prefix(MEMORY_SCHEME) {
            Some(name) if !name.is_empty() && !name.contains('/') => Ok(Self::Memory {
                name: name.to_string(),
            }),
            _ => Err(BrokerError::UnsupportedUri(uri.to_string())),
        }
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory { name } => write!(f, "{MEMORY_SCHEME}{name}"),
        }
    }
}

fn named_stores() -> &'static Mutex<HashMap<String, InMemoryStore>> {
    static STORES: OnceLock<Mutex<HashMap<String, InMemoryStore>>> = OnceLock::new();
    STORES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The process-wide in-memory store registered under `name`.
#[must_use]
pub fn shared_memory_store(name: &str) -> InMemoryStore {
    named_stores()
        .lock()
        .entry(name.to_string())
        .or_default()
        .clone()
}

/// Resolve `uri` and open `database` on it.
pub fn connect_store(uri: &str, database: &str) -> BrokerResult<Arc<dyn DocumentStore>> {
    if database.is_empty() {
        return Err(BrokerError::Config("database name cannot be empty".to_string()));
    }

    match uri.parse::<StoreUri>()? {
        StoreUri::Memory { name } => Ok(Arc::new(shared_memory_store(&name).database(database))),
    }
}
