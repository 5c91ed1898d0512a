//! Connection context shared by the coordinator and the action path.
//!
//! A `Session` bundles the wallet, the ledger read and write sides, the
//! optional pinner and the connected account. It is created on connect and
//! torn down with [`Session::close`]; nothing in the synchronizer reaches
//! for globals.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use tender_shared::{AccountProfile, Address};

use crate::config::NetConfig;
use crate::error::{NetError, Result};
use crate::ledger::RpcLedger;
use crate::pinning::PinataPinner;
use crate::rpc::JsonRpcClient;
use crate::traits::{ActionSubmitter, ContentPinner, RecordSource, WalletProvider};
use crate::wallet::RpcWallet;

/// Cheap to clone; clones observe the same connected account.
#[derive(Clone)]
pub struct Session {
    address: Arc<RwLock<Option<Address>>>,
    chain_id: Arc<RwLock<String>>,
    wallet: Arc<dyn WalletProvider>,
    source: Arc<dyn RecordSource>,
    submitter: Arc<dyn ActionSubmitter>,
    pinner: Option<Arc<dyn ContentPinner>>,
}

impl Session {
    /// Connect to the gateway described by `config`.
    ///
    /// A wallet that exposes no account yields a read-only session: records
    /// sync normally and actions fail with `Disconnected`.
    pub async fn connect(config: &NetConfig) -> Result<Self> {
        let rpc = JsonRpcClient::new(config.rpc_url.clone(), config.request_timeout)?;

        let wallet = RpcWallet::new(rpc.clone());
        wallet.start_watching(config.wallet_poll);

        let ledger = Arc::new(RpcLedger::new(rpc, config.contract.clone()));

        let pinner: Option<Arc<dyn ContentPinner>> =
            match (&config.pinning_url, &config.pinning_jwt) {
                (Some(url), Some(jwt)) => {
                    let http = reqwest::Client::builder()
                        .timeout(config.request_timeout)
                        .build()?;
                    Some(Arc::new(PinataPinner::new(http, url.clone(), jwt.clone())))
                }
                _ => None,
            };

        info!(
            rpc = %config.rpc_url,
            contract = %config.contract,
            pinning = pinner.is_some(),
            "Connecting session"
        );

        Self::from_parts(Arc::new(wallet), ledger.clone(), ledger, pinner).await
    }

    /// Assemble a session from already-built collaborators.
    pub async fn from_parts(
        wallet: Arc<dyn WalletProvider>,
        source: Arc<dyn RecordSource>,
        submitter: Arc<dyn ActionSubmitter>,
        pinner: Option<Arc<dyn ContentPinner>>,
    ) -> Result<Self> {
        let address = match wallet.request_accounts().await {
            Ok(accounts) => accounts.into_iter().next(),
            Err(NetError::NoAccounts) => None,
            Err(e) => {
                warn!(error = %e, "Wallet refused account access, continuing read-only");
                None
            }
        };

        let chain_id = wallet.chain_id().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not read chain id");
            String::new()
        });

        match &address {
            Some(addr) => info!(account = %addr.short(), chain = %chain_id, "Session connected"),
            None => info!(chain = %chain_id, "Session connected without an account"),
        }

        Ok(Self {
            address: Arc::new(RwLock::new(address)),
            chain_id: Arc::new(RwLock::new(chain_id)),
            wallet,
            source,
            submitter,
            pinner,
        })
    }

    pub fn address(&self) -> Option<Address> {
        self.address.read().ok().and_then(|guard| guard.clone())
    }

    /// Connected account, or [`NetError::NoAccounts`].
    pub fn require_address(&self) -> Result<Address> {
        self.address().ok_or(NetError::NoAccounts)
    }

    pub fn set_address(&self, address: Option<Address>) {
        if let Ok(mut guard) = self.address.write() {
            *guard = address;
        }
    }

    pub fn chain_id(&self) -> String {
        self.chain_id
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn set_chain_id(&self, chain_id: String) {
        if let Ok(mut guard) = self.chain_id.write() {
            *guard = chain_id;
        }
    }

    pub fn wallet(&self) -> &Arc<dyn WalletProvider> {
        &self.wallet
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.source
    }

    pub fn submitter(&self) -> &Arc<dyn ActionSubmitter> {
        &self.submitter
    }

    pub fn pinner(&self) -> Option<&Arc<dyn ContentPinner>> {
        self.pinner.as_ref()
    }

    /// Role and subscription of the connected account. `None` without one.
    pub async fn load_account(&self) -> Result<Option<AccountProfile>> {
        match self.address() {
            Some(address) => self.source.fetch_account(&address).await.map(Some),
            None => Ok(None),
        }
    }

    /// Stop wallet watching and forget the account.
    pub fn close(&self) {
        self.wallet.close();
        self.set_address(None);
        info!("Session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address())
            .field("chain_id", &self.chain_id())
            .field("pinning", &self.pinner.is_some())
            .finish()
    }
}
