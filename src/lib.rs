//! Hivegate - Per-key Request Rate Admission Gate
//!
//! This crate decides, request by request, whether a caller identified by a
//! key (client IP, API token, ...) is within its rate budget. Decisions are
//! made by a fixed-window counter or by GCRA against a shared counter store,
//! so every process pointing at the same store enforces one budget.

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
pub mod store;

pub use config::{GateConfig, HivegateConfig};
pub use error::{GateError, Result, StoreError};
pub use gate::{Gate, GateBuilder, GateLayer, Verdict};
pub use ratelimit::{Algorithm, Decision, Limit, RateLimiter};
pub use store::{CounterStore, MemoryStore};
