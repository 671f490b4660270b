//! `healthlink-core`: configuration, errors and domain types shared by every
//! HealthLink crate.

pub mod checkin;
pub mod config;
pub mod error;
pub mod tenant;
pub mod time;

pub use error::{HealthlinkError, Result};
