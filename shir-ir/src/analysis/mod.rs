//! Read-only analyses over a finished module

pub mod loops;
pub mod referenced;
pub mod workgroup;

pub use loops::{LoopAnalysis, LoopInfo};
pub use referenced::{ReferencedFunctions, ReferencedModuleDecls};
pub use workgroup::{workgroup_info, WorkgroupInfo};
