use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Envelope is missing a tab id")]
    MissingTabId,
}
