//! CLI command implementations.

pub mod check_config;
pub mod loaders;
pub mod replay;
pub mod structure;
