//! Vigía: continuous network-liveness monitoring engine.
//!
//! The engine polls a registry of addresses grouped by category, tracks
//! up/down state with failure debouncing, and pushes human-readable
//! alerts to whoever is subscribed. Control planes (a chat bot, an HTTP
//! surface) drive it through [`monitor::Monitor`]'s command API.

pub mod config;
pub mod monitor;
pub mod store;
