//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from engine orchestration.
//!
//! # Invariants
//! - The audit log is append-only; repositories expose no update path.

pub mod log_repo;
