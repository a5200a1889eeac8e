//! Configuration management for fluxrec.
//!
//! Handles loading and saving the TOML configuration file in the user's config
//! directory and turning it into the immutable per-session recording config.

pub mod file;

pub use file::{get_config_path, FluxConfig};
