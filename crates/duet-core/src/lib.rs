pub mod config;
pub mod error;
pub mod exchange;
pub mod prompt;
pub mod provider;
pub mod speech;

// Re-export common error type
pub use error::DuetError;
