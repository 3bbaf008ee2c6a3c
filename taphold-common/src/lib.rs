#![no_std]
pub mod globals;
pub mod keycodes;

/// Version word that starts every binary tap-hold config.
pub const PROTOCOL_VERSION: u16 = 1;

/// Marks a per-binding setting that falls back to the global value.
pub const USE_GLOBAL: u16 = u16::MAX;
