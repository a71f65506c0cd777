//! Recently accepted beacon addresses
//!
//! Observational only; nothing in the game depends on it.

pub const RECENT_PEER_CAPACITY: usize = 10;

/// Fixed-size ring of peer addresses, oldest entry overwritten first
#[derive(Debug, Clone, Default)]
pub struct RecentPeerCache {
    entries: Vec<String>,
    // next slot to write; equals entries.len() until the ring is full
    next: usize,
}

impl RecentPeerCache {
    pub fn new() -> Self {
        Self {
            entries: Vec::with_capacity(RECENT_PEER_CAPACITY),
            next: 0,
        }
    }

    pub fn record(&mut self, address: impl Into<String>) {
        let address = address.into();
        if self.entries.len() < RECENT_PEER_CAPACITY {
            self.entries.push(address);
        } else {
            self.entries[self.next] = address;
        }
        self.next = (self.next + 1) % RECENT_PEER_CAPACITY;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&str> {
        self.iter().next()
    }

    /// Newest first
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let len = self.entries.len();
        // next == len while filling, so this also covers the partial ring
        (1..=len).map(move |i| self.entries[(self.next + len - i) % len].as_str())
    }
}
