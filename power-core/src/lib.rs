#![no_std]

// Shared sleep/wake power management logic.
//
// Portable across MCU firmware and host tooling: no standard library, and every
// hardware touchpoint sits behind a capability trait a platform crate implements.

pub mod adapters;
pub mod orchestrator;
pub mod rails;
pub mod repl;
pub mod telemetry;
pub mod timer;
pub mod watchdog;
