//! `flowly-core`: configuration, shared error type and wire constants used
//! by every other Flowly crate.

pub mod config;
pub mod error;

pub use config::FlowlyConfig;
pub use error::{FlowlyError, Result};
