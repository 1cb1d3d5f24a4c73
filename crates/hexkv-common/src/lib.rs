//! # hexkv-common
//!
//! Common types, errors, and configuration for hexkv.
//!
//! hexkv lets a relational storage-engine front end run table scans, index
//! range scans, and row mutations against a store that only offers one
//! globally sorted byte-string keyspace. This crate holds the pieces every
//! other hexkv crate shares:
//!
//! - **Types**: byte keys and values, and the `TableId`, `IndexId` and
//!   `RowId` identifiers
//! - **Errors**: the unified `HexError` with stable error codes
//! - **Config**: `HandlerConfig`, loadable from TOML
//! - **Constants**: size limits and defaults
//!
//! ## Example
//!
//! ```rust
//! use hexkv_common::types::{Key, RowId, TableId};
//! use hexkv_common::error::HexResult;
//!
//! fn example() -> HexResult<()> {
//!     let table = TableId::new(7)?;
//!     let row = RowId::generate();
//!     let key = Key::from_bytes(b"hello");
//!     assert!(!row.is_nil());
//!     assert_eq!(table.as_u64(), 7);
//!     assert_eq!(key.len(), 5);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::{HandlerConfig, ScanMutationPolicy};
pub use constants::*;
pub use error::{ErrorCode, HexError, HexResult};
pub use types::{IndexId, Key, RowId, TableId, Value};
