//! Time utilities and abstractions
//!
//! - **Clock abstractions**: real and mock time for testing
//! - **[`duration_millis`](crate::utils::serde::duration_millis)**: serde
//!   helper for millisecond durations lives in `utils`

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
