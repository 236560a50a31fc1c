//! Flutter bridge surface for the reminder core.

pub mod api;
