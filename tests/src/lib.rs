//! # ackbus Test Suite
//!
//! Scenario tests that run several clients against one in-memory store.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs       # Clients, recorders, polling helpers
//! └── integration/
//!     ├── delivery.rs   # Fan-out and competing consumers
//!     ├── recovery.rs   # Offline publish, catch-up, feed/scan race
//!     ├── execution.rs  # Strategies, timeouts, decode failures
//!     ├── resilience.rs # Feed loss, reconnect, halt, ack failure
//!     └── lifecycle.rs  # Unsubscribe, cancel, drop, expiry, connect
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ackbus-tests
//! cargo test -p ackbus-tests integration::resilience::
//!
//! # Benchmarks
//! cargo bench -p ackbus-tests
//! ```

#![allow(dead_code)]

pub mod integration;
