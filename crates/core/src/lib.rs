//! Core types shared by every TaskHub crate.
//!
//! - [`Error`] / [`Result`]: typed, recoverable failures while loading configuration
//! - [`ResultExt`]: logging combinators for results that may be swallowed
//! - [`Config`]: the layered service configuration (defaults, TOML, env)

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod result;

pub use config::{AuthConfig, Config, SchedulerConfig, ServerConfig, StorageConfig};
pub use error::Error;
pub use result::{Result, ResultExt};
