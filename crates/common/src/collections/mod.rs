//! Bounded data structures
//!
//! - **[`ring_buffer`]**: fixed-capacity FIFO buffer with oldest-first
//!   eviction, shared by the metric store, request buffer and error log

pub mod ring_buffer;

pub use ring_buffer::RingBuffer;
