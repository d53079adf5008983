//! Console tooling shared between firmware and emulator targets.
//!
//! The grammar lives in [`grammar`] and stays `no_std` compatible; command
//! execution and response rendering live in [`commands`].

pub mod commands;
pub mod grammar;
