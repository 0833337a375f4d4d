//! # Native Boundary
//!
//! The surface native plugins see: a 32-bit callback handle going out, and
//! plain C functions taking that handle plus a payload coming back.

pub mod c_api;

pub use c_api::{install_native_registry, native_registry};
