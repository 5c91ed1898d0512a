//! Tender contract access through the JSON-RPC gateway.
//!
//! Reads go through `tender_call`, writes through `tender_send`, and
//! confirmations through `tender_getReceipt`. The gateway owns ABI encoding;
//! this module only speaks contract method names and JSON values.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use tender_shared::constants::{
    METHOD_GET_BIDS, METHOD_GET_BID_COUNT, METHOD_GET_ROLE, METHOD_HAS_SUBSCRIPTION,
    METHOD_SUBSCRIPTION_PRICE, METHOD_TENDERS, METHOD_TENDER_COUNT,
};
use tender_shared::types::wei;
use tender_shared::{AccountProfile, Address, Bid, ContractCall, Record, RecordId, Role};

use crate::error::{NetError, Result};
use crate::rpc::JsonRpcClient;
use crate::traits::{ActionSubmitter, Receipt, ReceiptStatus, RecordSource, TxHandle};

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Integers arrive as JSON numbers, decimal strings or 0x-hex strings.
fn flex_u64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    let value = Value::deserialize(d)?;
    parse_u64(&value).ok_or_else(|| serde::de::Error::custom(format!("not an integer: {value}")))
}

fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x") {
                Some(hex) => u64::from_str_radix(hex, 16).ok(),
                None => s.parse().ok(),
            }
        }
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenderWire {
    title: String,
    description: String,
    #[serde(with = "wei")]
    goal: u128,
    #[serde(deserialize_with = "flex_u64")]
    deadline: u64,
    organizer: Address,
    finalized: bool,
    #[serde(with = "wei", default)]
    total_raised: u128,
}

impl TenderWire {
    fn into_record(self, index: u64, bid_count: u64) -> Result<Record> {
        let deadline = i64::try_from(self.deadline).map_err(|_| {
            NetError::Decode(format!("tenders({index}): deadline {} out of range", self.deadline))
        })?;
        Ok(Record {
            id: RecordId::from_index(index),
            title: self.title,
            description: self.description,
            goal: self.goal,
            deadline,
            organizer: self.organizer,
            finalized: self.finalized,
            raised: self.total_raised,
            bid_count,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BidWire {
    bidder: Address,
    #[serde(with = "wei")]
    price: u128,
    #[serde(deserialize_with = "flex_u64")]
    quality: u64,
    #[serde(deserialize_with = "flex_u64")]
    days_required: u64,
}

impl TryFrom<BidWire> for Bid {
    type Error = NetError;

    fn try_from(wire: BidWire) -> Result<Self> {
        Ok(Bid {
            bidder: wire.bidder,
            price: wire.price,
            quality: u8::try_from(wire.quality)
                .map_err(|_| NetError::Decode(format!("quality {} out of range", wire.quality)))?,
            days_required: u16::try_from(wire.days_required).map_err(|_| {
                NetError::Decode(format!("daysRequired {} out of range", wire.days_required))
            })?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptWire {
    status: String,
    #[serde(default)]
    revert_reason: Option<String>,
}

fn decode_receipt(tx: &TxHandle, value: Value) -> Result<Option<Receipt>> {
    if value.is_null() {
        return Ok(None);
    }
    let wire: ReceiptWire = serde_json::from_value(value)?;
    let status = match wire.status.as_str() {
        "success" | "0x1" | "1" => ReceiptStatus::Success,
        _ => ReceiptStatus::Reverted(
            wire.revert_reason
                .unwrap_or_else(|| "transaction reverted".to_string()),
        ),
    };
    Ok(Some(Receipt {
        tx: tx.clone(),
        status,
    }))
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Tender contract reachable through the gateway.
#[derive(Debug, Clone)]
pub struct RpcLedger {
    rpc: JsonRpcClient,
    contract: Address,
}

impl RpcLedger {
    pub fn new(rpc: JsonRpcClient, contract: Address) -> Self {
        Self { rpc, contract }
    }

    async fn view(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.rpc
            .call(
                "tender_call",
                json!([{
                    "contract": self.contract.as_str(),
                    "method": method,
                    "args": args,
                }]),
            )
            .await
    }

    async fn bid_count(&self, index: u64) -> u64 {
        match self.view(METHOD_GET_BID_COUNT, vec![json!(index.to_string())]).await {
            Ok(value) => parse_u64(&value).unwrap_or_else(|| {
                warn!(index, value = %value, "Unreadable bid count");
                0
            }),
            Err(e) => {
                warn!(index, error = %e, "Could not get bid count");
                0
            }
        }
    }
}

#[async_trait]
impl RecordSource for RpcLedger {
    async fn fetch_count(&self) -> Result<u64> {
        let value = self.view(METHOD_TENDER_COUNT, vec![]).await?;
        parse_u64(&value).ok_or_else(|| NetError::Decode(format!("tenderCount: {value}")))
    }

    async fn fetch_record(&self, index: u64) -> Result<Record> {
        if index == 0 {
            return Err(NetError::NotFound(index));
        }

        let value = match self.view(METHOD_TENDERS, vec![json!(index.to_string())]).await {
            Ok(v) if v.is_null() => return Err(NetError::NotFound(index)),
            Ok(v) => v,
            // The gateway was reachable but the contract refused the slot.
            Err(NetError::Rpc { message, .. }) => {
                debug!(index, reason = %message, "Tender read reverted");
                return Err(NetError::NotFound(index));
            }
            Err(e) => return Err(e),
        };

        let wire: TenderWire = serde_json::from_value(value)
            .map_err(|e| NetError::Decode(format!("tenders({index}): {e}")))?;
        let bid_count = self.bid_count(index).await;
        wire.into_record(index, bid_count)
    }

    async fn fetch_bids(&self, id: RecordId) -> Result<Vec<Bid>> {
        let index = id.index().ok_or(NetError::NotFound(0))?;
        let value = self.view(METHOD_GET_BIDS, vec![json!(index.to_string())]).await?;
        let wires: Vec<BidWire> = serde_json::from_value(value)?;
        wires.into_iter().map(Bid::try_from).collect()
    }

    async fn fetch_account(&self, address: &Address) -> Result<AccountProfile> {
        let role_value = self.view(METHOD_GET_ROLE, vec![json!(address.as_str())]).await?;
        let role = parse_u64(&role_value)
            .and_then(|n| u8::try_from(n).ok())
            .and_then(Role::from_u8)
            .ok_or_else(|| NetError::Decode(format!("getRole: {role_value}")))?;

        let has_subscription = self
            .view(METHOD_HAS_SUBSCRIPTION, vec![json!(address.as_str())])
            .await?
            .as_bool()
            .ok_or_else(|| NetError::Decode("hasActiveSubscription: not a bool".into()))?;

        Ok(AccountProfile {
            address: address.clone(),
            role,
            has_subscription,
        })
    }

    async fn fetch_subscription_price(&self) -> Result<u128> {
        let value = self.view(METHOD_SUBSCRIPTION_PRICE, vec![]).await?;
        wei::deserialize(value).map_err(|e| NetError::Decode(format!("subscriptionPrice: {e}")))
    }
}

#[async_trait]
impl ActionSubmitter for RpcLedger {
    async fn submit(&self, from: &Address, call: &ContractCall) -> Result<TxHandle> {
        let params = json!([{
            "contract": self.contract.as_str(),
            "from": from.as_str(),
            "method": call.method,
            "args": call.args,
            "value": call.value.to_string(),
        }]);

        let tx: String = match self.rpc.call_as("tender_send", params).await {
            Ok(tx) => tx,
            Err(NetError::Rpc { message, .. }) => return Err(NetError::Reverted(message)),
            Err(e) => return Err(e),
        };

        info!(method = %call.method, tx = %tx, "Transaction submitted");
        Ok(TxHandle(tx))
    }

    async fn receipt(&self, tx: &TxHandle) -> Result<Option<Receipt>> {
        let value = self
            .rpc
            .call("tender_getReceipt", json!([tx.0]))
            .await?;
        decode_receipt(tx, value)
    }
}
