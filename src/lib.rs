//! Desktop air-quality monitor.
//!
//! A privileged host task (secrets, preferences, window/tray/notifications)
//! and an unprivileged presentation side (poll loop, terminal readout) talk
//! over the capability-scoped [`bridge`]. The poll loop fetches the station
//! feed on a fixed cadence, backs off on failure and raises a notification
//! when the category newly enters a high-severity band.

pub mod app;
pub mod aqi;
pub mod bridge;
pub mod config;
pub mod headless;
pub mod monitor;
pub mod storage;
pub mod ui;
pub mod util;
