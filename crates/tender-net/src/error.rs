use thiserror::Error;

use tender_shared::SyncError;

/// Errors produced by the transport layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// Connection, TLS or HTTP status failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The gateway answered with something we cannot decode.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Index-based read for a slot the contract does not have.
    #[error("Record {0} not found")]
    NotFound(u64),

    /// The contract reverted a write.
    #[error("Reverted: {0}")]
    Reverted(String),

    /// The pinning service failed.
    #[error("Upload error: {0}")]
    Upload(String),

    /// The wallet exposes no account.
    #[error("No wallet account available")]
    NoAccounts,

    /// The backing implementation does not offer this view.
    #[error("Unsupported: {0}")]
    Unsupported(&'static str),

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for NetError {
    fn from(err: serde_json::Error) -> Self {
        NetError::Decode(err.to_string())
    }
}

impl From<NetError> for SyncError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::NotFound(index) => SyncError::NotFound(index),
            NetError::Reverted(reason) => SyncError::ActionRejected(reason),
            NetError::Upload(msg) => SyncError::Upload(msg),
            NetError::NoAccounts => SyncError::Disconnected,
            other => SyncError::Transport(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_into_sync_error() {
        assert_eq!(SyncError::from(NetError::NotFound(4)), SyncError::NotFound(4));
        assert_eq!(
            SyncError::from(NetError::Reverted("Bidding closed".into())),
            SyncError::ActionRejected("Bidding closed".into())
        );
        assert!(matches!(
            SyncError::from(NetError::Rpc {
                code: -32000,
                message: "header not found".into()
            }),
            SyncError::Transport(_)
        ));
        assert_eq!(SyncError::from(NetError::NoAccounts), SyncError::Disconnected);
    }
}
