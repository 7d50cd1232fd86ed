//! Shared types

pub mod error;

pub use error::{BrokerError, Result};
