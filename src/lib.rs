//! Property tax and home value comparison for Westchester County municipalities.

pub mod core;

pub use crate::core::*;
