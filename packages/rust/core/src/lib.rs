//! Install generation pipeline for manifestgen.
//!
//! This crate ties together version resolution, release fetching, overlay
//! generation, and building into one call ([`install::generate`]).

pub mod install;
pub mod version;

pub use install::{ProgressReporter, SilentProgress, generate, generate_with_progress};
pub use version::resolve_version;
