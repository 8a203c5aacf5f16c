//! Library half of the `loopsplit` CLI.
//!
//! `main.rs` is a thin shell around this crate so the class-file codec and
//! the input-walking logic can be exercised directly from `tests/`, the same
//! way `loopsplit-core` is tested without going through a binary.

pub mod classio;
pub mod commands;
pub mod error;
pub mod jarfile;
pub mod walker;
