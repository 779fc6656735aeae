//! Token lifecycle: an [`ApiKey`] is exchanged for short-lived [`Token`]s.

pub mod manager;
pub mod token;

pub use manager::TokenManager;
pub use token::{ApiKey, Token};
