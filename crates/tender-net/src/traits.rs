//! Seams between the synchronizer and the outside world.
//!
//! The coordinator only ever talks to these traits, so tests can swap the
//! gateway for in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use tender_shared::{AccountProfile, Address, Bid, ContractCall, PinnedContent, Record, RecordId};

use crate::error::{NetError, Result};

/// Read side of the ledger.
///
/// No caching: every call may hit the network.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Number of record slots, materialized or not.
    async fn fetch_count(&self) -> Result<u64>;

    /// Record at a 1-based index in `1..=count`.
    async fn fetch_record(&self, index: u64) -> Result<Record>;

    /// Every bid placed on a tender.
    async fn fetch_bids(&self, _id: RecordId) -> Result<Vec<Bid>> {
        Err(NetError::Unsupported("fetch_bids"))
    }

    /// Role and subscription state of an account.
    async fn fetch_account(&self, _address: &Address) -> Result<AccountProfile> {
        Err(NetError::Unsupported("fetch_account"))
    }

    /// Current subscription price in wei.
    async fn fetch_subscription_price(&self) -> Result<u128> {
        Err(NetError::Unsupported("fetch_subscription_price"))
    }
}

/// Handle of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle(pub String);

impl std::fmt::Display for TxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    /// Revert reason as reported by the ledger.
    Reverted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx: TxHandle,
    pub status: ReceiptStatus,
}

/// Write side of the ledger, signed by the connected wallet.
#[async_trait]
pub trait ActionSubmitter: Send + Sync {
    /// Sign and submit `call` from `from`.
    ///
    /// A refusal at submission time (simulation revert, user rejection) is
    /// reported as [`NetError::Reverted`].
    async fn submit(&self, from: &Address, call: &ContractCall) -> Result<TxHandle>;

    /// `None` while the transaction is still pending.
    async fn receipt(&self, tx: &TxHandle) -> Result<Option<Receipt>>;
}

/// Notifications emitted by the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    /// The exposed accounts changed; the first one is the active account.
    AccountsChanged(Vec<Address>),
    /// The wallet switched networks.
    ChainChanged(String),
    /// The wallet stopped answering or revoked access.
    Disconnected,
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the wallet for account access. May prompt the user.
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// Active account, without prompting.
    async fn current_address(&self) -> Result<Option<Address>>;

    async fn chain_id(&self) -> Result<String>;

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;

    /// Stop any background watcher. Called on session teardown.
    fn close(&self) {}
}

/// Black-box upload of off-record content.
#[async_trait]
pub trait ContentPinner: Send + Sync {
    async fn pin(&self, name: &str, bytes: &[u8]) -> Result<PinnedContent>;
}
