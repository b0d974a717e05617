//! Shader IR - Common Types and Utilities
//! 
//! This crate contains the diagnostic types shared by every part of the
//! shader IR toolchain: the validator, the binary codec and the driver.

pub mod error;
pub mod source_loc;

pub use error::{Diagnostic, Diagnostics, Failure, Severity};
pub use source_loc::{SourceLocation, SourceSpan, SourceTracker};
