//! Wallet access through the gateway's `eth_*` account methods.
//!
//! The gateway cannot push events, so a background task polls the exposed
//! accounts and chain id and turns every change into a [`WalletEvent`].

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use tender_shared::Address;

use crate::error::Result;
use crate::rpc::JsonRpcClient;
use crate::traits::{WalletEvent, WalletProvider};

/// Consecutive failed polls before the wallet is reported as disconnected.
const DISCONNECT_AFTER_FAILURES: u32 = 3;

pub struct RpcWallet {
    rpc: JsonRpcClient,
    events: broadcast::Sender<WalletEvent>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl RpcWallet {
    pub fn new(rpc: JsonRpcClient) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            rpc,
            events,
            watcher: Mutex::new(None),
        }
    }

    /// Start polling for account and chain changes. Replaces any running
    /// watcher.
    pub fn start_watching(&self, every: Duration) {
        let rpc = self.rpc.clone();
        let events = self.events.clone();
        let handle = tokio::spawn(watch_loop(rpc, events, every));

        if let Ok(mut guard) = self.watcher.lock() {
            if let Some(old) = guard.replace(handle) {
                old.abort();
            }
        }
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let raw: Vec<String> = self.rpc.call_as("eth_requestAccounts", json!([])).await?;
        Ok(parse_accounts(&raw))
    }

    async fn current_address(&self) -> Result<Option<Address>> {
        let raw: Vec<String> = self.rpc.call_as("eth_accounts", json!([])).await?;
        Ok(parse_accounts(&raw).into_iter().next())
    }

    async fn chain_id(&self) -> Result<String> {
        self.rpc.call_as("eth_chainId", json!([])).await
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    fn close(&self) {
        if let Ok(mut guard) = self.watcher.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
                debug!("Wallet watcher stopped");
            }
        }
    }
}

impl Drop for RpcWallet {
    fn drop(&mut self) {
        self.close();
    }
}

fn parse_accounts(raw: &[String]) -> Vec<Address> {
    raw.iter()
        .filter_map(|s| match Address::parse(s) {
            Ok(addr) => Some(addr),
            Err(e) => {
                warn!(account = %s, error = %e, "Skipping malformed wallet account");
                None
            }
        })
        .collect()
}

async fn watch_loop(rpc: JsonRpcClient, events: broadcast::Sender<WalletEvent>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut state = PollState::default();

    info!(every_ms = every.as_millis() as u64, "Wallet watcher started");

    loop {
        interval.tick().await;

        let polled = async {
            let accounts: Vec<String> = rpc.call_as("eth_accounts", json!([])).await?;
            let chain: String = rpc.call_as("eth_chainId", json!([])).await?;
            Ok::<_, crate::error::NetError>((parse_accounts(&accounts), chain))
        }
        .await;

        let changes = match polled {
            Ok((accounts, chain)) => state.on_success(accounts, chain),
            Err(e) => {
                debug!(failures = state.failures + 1, error = %e, "Wallet poll failed");
                state.on_failure().into_iter().collect()
            }
        };

        for change in changes {
            match change {
                WalletEvent::Disconnected => warn!("Wallet unreachable, reporting disconnect"),
                ref other => info!(event = ?other, "Wallet changed"),
            }
            let _ = events.send(change);
        }
    }
}

/// What the watcher last saw. The first successful poll only primes it.
#[derive(Debug, Default)]
struct PollState {
    accounts: Option<Vec<Address>>,
    chain: Option<String>,
    failures: u32,
    disconnected: bool,
}

impl PollState {
    fn on_failure(&mut self) -> Option<WalletEvent> {
        self.failures += 1;
        if self.failures == DISCONNECT_AFTER_FAILURES && !self.disconnected {
            self.disconnected = true;
            return Some(WalletEvent::Disconnected);
        }
        None
    }

    /// After a reported disconnect the accounts are announced again even if
    /// unchanged, since listeners dropped them.
    fn on_success(&mut self, accounts: Vec<Address>, chain: String) -> Vec<WalletEvent> {
        let mut out = Vec::new();
        let reconnected = std::mem::take(&mut self.disconnected);
        self.failures = 0;

        match self.accounts.as_mut() {
            Some(prev) if reconnected || *prev != accounts => {
                out.push(WalletEvent::AccountsChanged(accounts.clone()));
                *prev = accounts;
            }
            Some(_) => {}
            None if reconnected => {
                out.push(WalletEvent::AccountsChanged(accounts.clone()));
                self.accounts = Some(accounts);
            }
            None => self.accounts = Some(accounts),
        }

        match self.chain.as_mut() {
            Some(prev) if *prev != chain => {
                out.push(WalletEvent::ChainChanged(chain.clone()));
                *prev = chain;
            }
            Some(_) => {}
            None => self.chain = Some(chain),
        }

        out
    }
}
