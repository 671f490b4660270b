//! Tenants (accounts) and the patients they own.

pub mod db;
pub mod directory;
pub mod error;
pub mod types;

pub use directory::AccountDirectory;
pub use error::{AccountError, Result};
pub use types::{Account, Patient};
