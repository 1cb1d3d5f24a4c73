//! Configuration for hexkv.
//!
//! Handler settings are loaded from TOML and shared by every handle a
//! factory creates.

mod handler;

pub use handler::{HandlerConfig, HandlerConfigBuilder, ScanMutationPolicy};
