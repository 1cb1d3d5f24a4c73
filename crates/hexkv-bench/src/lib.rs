//! hexkv performance benchmarks
//!
//! - Key encoding: varints, index values and full row keys
//! - Handler: inserts, table scans and index scans over the in-memory store
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p hexkv-bench
//! ```

pub mod utils;
