//! Command handlers.

pub mod config_cmd;
pub mod demo;
