//! Keyed ring buffer backing the secondary stream.
//!
//! The ring holds a fixed window of recent records with O(1) lookup via a
//! hash index. The merge stage joins primary records against it.

mod ring_buffer;

pub use ring_buffer::{KeyedRingBuffer, RingBufferStats};
