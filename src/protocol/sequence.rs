// Packet sequence numbers, shared by every command kind on a session

use std::sync::atomic::{AtomicU32, Ordering};

/// Hands out 8-bit sequence numbers in call order, wrapping after 255
#[derive(Debug, Default)]
pub struct SequenceGenerator {
    counter: AtomicU32,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the current value masked to 8 bits, then advance
    pub fn next(&self) -> u8 {
        (self.counter.fetch_add(1, Ordering::Relaxed) & 0xFF) as u8
    }

    /// Value the next call to `next` will return
    pub fn peek(&self) -> u8 {
        (self.counter.load(Ordering::Relaxed) & 0xFF) as u8
    }
}
