//! Player persistence

pub mod players;

pub use players::JsonPlayerStore;

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed save file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("save writer is no longer running")]
    WriterClosed,
}
