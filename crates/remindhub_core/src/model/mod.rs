//! Domain model for reminder scheduling and delivery.
//!
//! # Responsibility
//! - Define canonical data structures shared by the engine, stores and FFI.
//! - Keep wire formats (payload, journal JSON) next to the types they encode.
//!
//! # Invariants
//! - Notification IDs are non-negative 31-bit integers carried as `i32`.
//! - Times are epoch milliseconds (`i64`).

pub mod delivery;
pub mod log_entry;
pub mod module;
pub mod payload;
pub mod request;
pub mod settings;
pub mod tracked;
