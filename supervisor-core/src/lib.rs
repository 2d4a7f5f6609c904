#![cfg_attr(not(test), no_std)]

// Supervisory core of the hub firmware.
//
// Everything here is portable across the MCU firmware and host tooling: the
// crate avoids the standard library and reaches hardware only through the
// collaborator traits in `hub`.

pub mod config;
pub mod hmi;
pub mod hub;
pub mod power;
pub mod program;
pub mod status;
pub mod supervisor;
pub mod telemetry;
pub mod time;
