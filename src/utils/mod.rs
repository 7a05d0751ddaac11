//! Generic utility primitives with zero domain knowledge.
//!
//! - `artifact` - Artifact path resolution with glob support
//! - `io` - File I/O with consistent error handling
//! - `validation` - Input validation helpers

pub mod artifact;
pub mod io;
pub mod validation;
