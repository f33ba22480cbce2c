//! Filesystem and path helpers shared by the aptsrc crates.

pub mod error;
pub mod fs;
pub mod path;
