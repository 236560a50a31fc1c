//! In-process registries owned by the hub.

pub mod adapter_registry;
pub mod module_registry;
pub mod type_registry;
