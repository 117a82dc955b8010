// Common library shared by the watcher and enricher binaries

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod runner;
pub mod store;
pub mod table;
pub mod telemetry;
pub mod trigger;
