//! Media field kernel library.
//!
//! File lifecycle for media fields edited with the limited editor:
//! reconciling submitted uploads against storage, purging abandoned
//! uploads, and guarding access to the media fields folder.
//! The `mediafield` binary wraps these services in a small CLI.

pub mod config;
pub mod cron;
pub mod file;
pub mod media_field;
pub mod permissions;
pub mod settings;
pub mod state;

pub use config::Config;
pub use state::AppState;
