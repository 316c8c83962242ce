//! CLI subcommands for `tierbatch-cli`.
//!
//! Each command returns a process exit code:
//!
//! - `0` success / healthy
//! - `1` failure / unhealthy
//! - `2` configuration error

pub mod config_cmd;
pub mod health;
pub mod translate;

pub use health::run_health;
pub use translate::{parse_translate_args, run_translate, TranslateArgs};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;
