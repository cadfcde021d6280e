/// Local errors raised before anything is sent to the bridge
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Instance does not match protocol schema: {0}")]
    SchemaMismatch(#[from] serde_json::Error),

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),
}
