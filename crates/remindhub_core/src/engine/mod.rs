//! Scheduling and delivery engine.
//!
//! # Responsibility
//! - Derive stable notification IDs and enforce backup-ID symmetry.
//! - Apply quiet hours and choose a dispatch path.
//! - Orchestrate scheduling, snooze, cancellation and callbacks in
//!   [`hub::NotificationHub`].

pub mod dispatch;
pub mod hub;
pub mod ids;
pub mod quiet_hours;
pub mod resolver;
pub mod snooze;
