//! Type definitions for hexkv.
//!
//! This module contains the identifier and byte-string types shared by the
//! store interface and the engine.

mod ids;
mod keys;

pub use ids::{IndexId, RowId, TableId};
pub use keys::{Key, Value};
