#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("no Bluetooth adapter found")]
    NoAdapter,
    #[error("peer not found: {0}")]
    PeerNotFound(String),
    #[error("proximity characteristic not found")]
    CharacteristicNotFound,
    #[error("characteristic does not support writing")]
    WriteUnsupported,
    #[error("not connected")]
    NotConnected,
    #[error("signal strength unavailable")]
    SignalUnavailable,
    #[error("transport event stream closed")]
    EventStreamClosed,
    #[error("BLE backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("could not determine home directory")]
    NoHome,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}
