//! CLI command implementations

pub mod config;
pub mod demo;

pub use config::execute as config;
pub use demo::execute as demo;
