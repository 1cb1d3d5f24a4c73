//! Error handling for hexkv.
//!
//! This module provides a unified error type and result alias used
//! across all hexkv components.

mod handler;

pub use handler::{ErrorCode, HexError};

/// Result type alias for hexkv operations.
pub type HexResult<T> = std::result::Result<T, HexError>;
