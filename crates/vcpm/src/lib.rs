#![forbid(unsafe_code)]

pub mod cli;
pub mod telemetry;

pub use cli::BuildArgs;
