#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Error types for the image processing module.
pub mod error;

/// image filtering module.
pub mod filter;

/// utilities for interpolation.
pub mod interpolation;

/// module containing parallization utilities.
pub mod parallel;

/// Pyramid operations
pub mod pyramid;

pub use error::ImgprocError;
