/// One connection attempt to a beacon, from acceptance to disconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSession {
    peer: String,
    connected: bool,
    first_message: bool,
}

impl ConnectionSession {
    pub fn new(peer: impl Into<String>) -> Self {
        Self {
            peer: peer.into(),
            connected: false,
            first_message: true,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn mark_connected(&mut self) {
        self.connected = true;
    }

    pub fn first_message_pending(&self) -> bool {
        self.first_message
    }

    /// True exactly once per session, on the first inbound message
    pub fn take_first_message(&mut self) -> bool {
        std::mem::replace(&mut self.first_message, false)
    }
}
