//! Shared configuration, logging and small utilities for the odx toolkit.

pub mod config;
pub mod logging;
pub mod util;

pub use config::{OdxConfig, PgConfig, Transport};
