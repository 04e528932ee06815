//! Common utility functions
//!
//! - **[`serde`]**: serialization helpers for common data types

pub mod serde;

pub use self::serde::{as_millis_f64, duration_millis};
