//! System utilities: startup configuration

pub mod config;

pub use config::*;
