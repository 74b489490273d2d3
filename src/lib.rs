// Monitored entity identities
pub mod reference;

// Reference-set polling and change notification
pub mod monitor;

// Deadlock dump parsing and wait-for analysis
pub mod deadlock;

// TOML configuration
pub mod config;
