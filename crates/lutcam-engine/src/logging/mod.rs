//! Logger bootstrap.
//!
//! The crate itself only talks to the `log` facade; this module wires
//! `env_logger` up for binaries and tests that want output.

mod init;

pub use init::{LoggingConfig, init_logging};
