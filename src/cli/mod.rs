//! CLI subcommands that run without a live service.
//!
//! ## Usage
//!
//! ```bash
//! query-control config show       # Effective configuration
//! query-control config defaults   # Documented defaults
//! query-control config validate   # Exit 1 if anything fell back
//! ```

pub mod config_cmd;

pub use config_cmd::{run_defaults, run_show, run_validate};
