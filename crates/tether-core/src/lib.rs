// Core resume engine without UI or transport dependencies

pub mod api;
pub mod cache;
pub mod config;
pub mod cursor;
pub mod error;
pub mod message;
pub mod resume;
pub mod status;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
