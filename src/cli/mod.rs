//! CLI command handlers

pub mod commands;

pub use commands::{detect, migrate, scan};
