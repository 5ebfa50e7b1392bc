//! # loom-core
//!
//! Core crate for the Loom plugin runtime. Contains the unified error
//! system and the configuration schemas shared by the runtime and its host.
//!
//! This crate has **no** internal dependencies on other Loom crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
