// Public modules
pub mod clear;
pub mod config;
pub mod deploy;
pub mod error;
pub mod extract;
pub mod github;
pub mod local_files;
pub mod paths;
pub mod preserve;
pub mod site;
pub mod source;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
