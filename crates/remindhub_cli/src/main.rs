//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `remindhub_core` linkage.
//! - Print the built-in module ID ranges for quick local sanity checks.
//! - Optionally decode a payload passed as the first argument and print
//!   the ID its module would derive for it.

use remindhub_core::registry::module_registry::ModuleRegistry;
use remindhub_core::{derive_notification_id, Fingerprint, NotificationPayload};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("remindhub_core ping={}", remindhub_core::ping());
    println!("remindhub_core version={}", remindhub_core::core_version());

    let registry = match ModuleRegistry::with_builtin() {
        Ok(registry) => {
            for module in registry.iter() {
                println!(
                    "module id={} range={}..{}",
                    module.id,
                    module.id_range_start,
                    module.id_range_start + module.id_range_size
                );
            }
            registry
        }
        Err(err) => {
            eprintln!("module registry invalid: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(raw) = std::env::args().nth(1) {
        match NotificationPayload::parse(&raw) {
            Ok(payload) => {
                let derived = registry.get(&payload.module_id).map(|module| {
                    derive_notification_id(module, &Fingerprint::from_payload(&payload))
                });
                println!(
                    "payload module={} entity={} snooze_count={} derived_id={}",
                    payload.module_id,
                    payload.entity_id,
                    payload.snooze_count(),
                    derived.map_or_else(|| "none".to_string(), |id| id.to_string())
                );
            }
            Err(err) => {
                eprintln!("payload invalid: {err}");
                return ExitCode::FAILURE;
            }
        }
    }
    ExitCode::SUCCESS
}
