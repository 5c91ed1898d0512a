//! In-memory collaborators for driving a coordinator without a network.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};

use tender_net::error::Result;
use tender_net::{
    ActionSubmitter, ContentPinner, NetError, Receipt, ReceiptStatus, RecordSource, Session,
    TxHandle, WalletEvent, WalletProvider,
};
use tender_shared::{
    AccountProfile, Address, Bid, ContractCall, PinnedContent, Record, RecordId, Role,
};
use tender_sync::{SyncConfig, SyncHandle};

pub fn addr(last: &str) -> Address {
    Address::parse(&format!("0x{:0>40}", last)).unwrap()
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn record(index: u64, title: &str) -> Record {
    Record {
        id: RecordId::from_index(index),
        title: title.to_string(),
        description: format!("{title} description"),
        goal: 10,
        deadline: now() + 10 * 86_400,
        organizer: addr("0a"),
        finalized: false,
        raised: 0,
        bid_count: 0,
    }
}

/// Config with timers that stay out of the way of a test.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        poll_interval: Duration::from_secs(3_600),
        ..SyncConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeLedger {
    records: Mutex<Vec<Record>>,
    failing_indices: Mutex<HashSet<u64>>,
    missing_indices: Mutex<HashSet<u64>>,
    fail_count: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    count_calls: AtomicUsize,
    record_latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    accounts: Mutex<HashMap<Address, AccountProfile>>,
    bids: Mutex<HashMap<RecordId, Vec<Bid>>>,
    submitted: Mutex<Vec<(Address, ContractCall)>>,
    submit_rejection: Mutex<Option<String>>,
    receipts: Mutex<HashMap<String, ReceiptStatus>>,
}

impl FakeLedger {
    pub fn with_records(records: Vec<Record>) -> Arc<Self> {
        let ledger = Self::default();
        *ledger.records.lock().unwrap() = records;
        Arc::new(ledger)
    }

    pub fn set_records(&self, records: Vec<Record>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn update_record(&self, index: u64, f: impl FnOnce(&mut Record)) {
        let mut records = self.records.lock().unwrap();
        f(&mut records[(index - 1) as usize]);
    }

    pub fn push_record(&self, record: Record) {
        self.records.lock().unwrap().push(record);
    }

    pub fn fail_index(&self, index: u64) {
        self.failing_indices.lock().unwrap().insert(index);
    }

    pub fn drop_index(&self, index: u64) {
        self.missing_indices.lock().unwrap().insert(index);
    }

    pub fn set_count_failing(&self, failing: bool) {
        self.fail_count.store(failing, Ordering::SeqCst);
    }

    /// Hold every count fetch until a permit is released.
    pub fn gate(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    /// Make every record fetch take `latency` on the test clock.
    pub fn set_record_latency(&self, latency: Duration) {
        *self.record_latency.lock().unwrap() = Some(latency);
    }

    /// Most record fetches ever running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn read_record(&self, index: u64) -> Result<Record> {
        if self.failing_indices.lock().unwrap().contains(&index) {
            return Err(NetError::Rpc {
                code: -32603,
                message: "connection reset".into(),
            });
        }
        if index == 0 || self.missing_indices.lock().unwrap().contains(&index) {
            return Err(NetError::NotFound(index));
        }
        self.records
            .lock()
            .unwrap()
            .get((index - 1) as usize)
            .cloned()
            .ok_or(NetError::NotFound(index))
    }

    pub fn set_account(&self, profile: AccountProfile) {
        self.accounts
            .lock()
            .unwrap()
            .insert(profile.address.clone(), profile);
    }

    pub fn set_bids(&self, id: RecordId, bids: Vec<Bid>) {
        self.bids.lock().unwrap().insert(id, bids);
    }

    pub fn submitted(&self) -> Vec<(Address, ContractCall)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn reject_submissions(&self, reason: &str) {
        *self.submit_rejection.lock().unwrap() = Some(reason.to_string());
    }

    /// Make the receipt of the n-th submitted transaction (1-based) available.
    pub fn land(&self, n: usize, status: ReceiptStatus) {
        self.receipts
            .lock()
            .unwrap()
            .insert(format!("0x{n:x}"), status);
    }
}

#[async_trait]
impl RecordSource for FakeLedger {
    async fn fetch_count(&self) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| NetError::Decode("gate closed".into()))?
                .forget();
        }

        if self.fail_count.load(Ordering::SeqCst) {
            return Err(NetError::Rpc {
                code: -32000,
                message: "upstream unavailable".into(),
            });
        }
        Ok(self.records.lock().unwrap().len() as u64)
    }

    async fn fetch_record(&self, index: u64) -> Result<Record> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        let latency = *self.record_latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let result = self.read_record(index);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn fetch_bids(&self, id: RecordId) -> Result<Vec<Bid>> {
        Ok(self.bids.lock().unwrap().get(&id).cloned().unwrap_or_default())
    }

    async fn fetch_account(&self, address: &Address) -> Result<AccountProfile> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or(AccountProfile {
                address: address.clone(),
                role: Role::User,
                has_subscription: false,
            }))
    }

    async fn fetch_subscription_price(&self) -> Result<u128> {
        Ok(1_000)
    }
}

#[async_trait]
impl ActionSubmitter for FakeLedger {
    async fn submit(&self, from: &Address, call: &ContractCall) -> Result<TxHandle> {
        if let Some(reason) = self.submit_rejection.lock().unwrap().clone() {
            return Err(NetError::Reverted(reason));
        }
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((from.clone(), call.clone()));
        Ok(TxHandle(format!("0x{:x}", submitted.len())))
    }

    async fn receipt(&self, tx: &TxHandle) -> Result<Option<Receipt>> {
        Ok(self.receipts.lock().unwrap().get(&tx.0).map(|status| Receipt {
            tx: tx.clone(),
            status: status.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

pub struct FakeWallet {
    accounts: Vec<Address>,
    events: broadcast::Sender<WalletEvent>,
}

impl FakeWallet {
    pub fn new(accounts: Vec<Address>) -> Arc<Self> {
        Arc::new(Self {
            accounts,
            events: broadcast::channel(16).0,
        })
    }

    pub fn emit(&self, event: WalletEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl WalletProvider for FakeWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        if self.accounts.is_empty() {
            return Err(NetError::NoAccounts);
        }
        Ok(self.accounts.clone())
    }

    async fn current_address(&self) -> Result<Option<Address>> {
        Ok(self.accounts.first().cloned())
    }

    async fn chain_id(&self) -> Result<String> {
        Ok("0x7a69".into())
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Pinner
// ---------------------------------------------------------------------------

pub struct FakePinner {
    fail: bool,
    pub calls: AtomicUsize,
}

impl FakePinner {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ContentPinner for FakePinner {
    async fn pin(&self, name: &str, bytes: &[u8]) -> Result<PinnedContent> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NetError::Upload("pinning service returned 401".into()));
        }
        Ok(PinnedContent {
            content_id: format!("bafy-{name}"),
            content_hash: format!("{:064x}", bytes.len()),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub ledger: Arc<FakeLedger>,
    pub wallet: Arc<FakeWallet>,
    pub handle: SyncHandle,
}

pub async fn spawn_with(
    ledger: Arc<FakeLedger>,
    accounts: Vec<Address>,
    pinner: Option<Arc<FakePinner>>,
    config: SyncConfig,
) -> Harness {
    let wallet = FakeWallet::new(accounts);
    let session = Session::from_parts(
        wallet.clone(),
        ledger.clone(),
        ledger.clone(),
        pinner.map(|p| p as Arc<dyn ContentPinner>),
    )
    .await
    .unwrap();
    let handle = SyncHandle::spawn(session, config);
    Harness {
        ledger,
        wallet,
        handle,
    }
}

pub async fn spawn(ledger: Arc<FakeLedger>) -> Harness {
    spawn_with(ledger, vec![addr("a1")], None, test_config()).await
}

/// Poll `cond` on the paused clock until it holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

pub async fn wait_for_generation(handle: &SyncHandle, generation: u64) {
    wait_until(|| handle.snapshot().generation >= generation).await;
}

pub fn ids(handle: &SyncHandle) -> Vec<i64> {
    handle
        .snapshot()
        .entries
        .iter()
        .map(|e| e.record.id.0)
        .collect()
}
