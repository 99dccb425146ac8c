//! CLI command implementations

pub mod config;
pub mod json_output;
pub mod predict;
pub mod replay;
pub mod synth;
