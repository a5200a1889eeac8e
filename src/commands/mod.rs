//! Application command handlers for fluxrec.
//!
//! # Commands
//! - `record`: Screen recording with optional webcam overlay and microphone
//! - `trim`: Lossless cut of a finished recording
//! - `merge`: Mux a standalone audio track into a recording
//! - `recordings`: List recordings in the save directory
//! - `delete`: Remove a recording
//! - `config`: Open configuration file in user's preferred editor
//! - `list_devices`: List monitors, windows, cameras and audio inputs
//! - `logs`: Display recent log entries

pub mod config;
pub mod list_devices;
pub mod logs;
pub mod merge;
pub mod record;
pub mod recordings;
pub mod trim;

pub use config::handle_config;
pub use list_devices::handle_list_devices;
pub use logs::handle_logs;
pub use merge::handle_merge;
pub use record::handle_record;
pub use recordings::{handle_delete, handle_recordings};
pub use trim::handle_trim;
