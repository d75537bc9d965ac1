//! Protocol module - device memory constants and byte-level field access.

pub mod bytes;
pub mod constants;

pub use constants::*;
