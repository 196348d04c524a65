//! Foundational types for the Builder preprocessor.

pub mod diagnostics;
pub mod errors;
pub mod location;
