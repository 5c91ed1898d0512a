use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::WEI_PER_ETH;
use crate::error::SyncError;

// Record identity: positive for ledger tenders, negative for local placeholders.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Id of the ledger record at a 1-based index.
    pub fn from_index(index: u64) -> Self {
        Self(index as i64)
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 < 0
    }

    /// The 1-based ledger index, `None` for placeholders.
    pub fn index(&self) -> Option<u64> {
        (self.0 > 0).then_some(self.0 as u64)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account address: `0x` followed by 40 hex digits, stored lowercase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| SyncError::InvalidPayload(format!("address {s:?} lacks 0x prefix")))?;
        if digits.len() != 40 {
            return Err(SyncError::InvalidPayload(format!(
                "address {s:?} must have 40 hex digits, got {}",
                digits.len()
            )));
        }
        hex::decode(digits)
            .map_err(|e| SyncError::InvalidPayload(format!("address {s:?}: {e}")))?;
        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `0x1234...abcd`, as shown next to tenders and in the account badge.
    pub fn short(&self) -> String {
        if self.0.len() < 10 {
            return self.0.clone();
        }
        format!("{}...{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl TryFrom<String> for Address {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Wei amounts travel as decimal strings; plain JSON numbers are accepted too.
pub mod wei {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(n as u128),
        }
    }
}

/// Render a wei amount as ether with two decimals (truncated).
pub fn format_eth(amount: u128) -> String {
    let whole = amount / WEI_PER_ETH;
    let cents = (amount % WEI_PER_ETH) / (WEI_PER_ETH / 100);
    format!("{whole}.{cents:02} ETH")
}

/// One tender as stored by the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub title: String,
    pub description: String,
    #[serde(with = "wei")]
    pub goal: u128,
    /// Unix seconds.
    pub deadline: i64,
    pub organizer: Address,
    pub finalized: bool,
    #[serde(with = "wei", default)]
    pub raised: u128,
    #[serde(default)]
    pub bid_count: u64,
}

impl Record {
    /// The ledger reports slots for writes that have not landed yet; those
    /// come back with an empty title or a zero goal.
    pub fn is_materialized(&self) -> bool {
        !self.title.is_empty() && self.goal > 0
    }

    pub fn deadline_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.deadline, 0)
    }
}

/// Partial record carrying the expected effect of an in-flight action.
///
/// Values are absolute (the bid count *after* the bid lands), so the patch
/// can be compared field by field against what the ledger later reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub goal: Option<u128>,
    pub deadline: Option<i64>,
    pub organizer: Option<Address>,
    pub finalized: Option<bool>,
    pub raised: Option<u128>,
    pub bid_count: Option<u64>,
    /// `raised` when the action was dispatched. Gives the direction the
    /// total must move for `raised` to count as reflected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raised_from: Option<u128>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == RecordPatch::default()
    }

    pub fn apply_to(&self, record: &mut Record) {
        if let Some(ref title) = self.title {
            record.title = title.clone();
        }
        if let Some(ref description) = self.description {
            record.description = description.clone();
        }
        if let Some(goal) = self.goal {
            record.goal = goal;
        }
        if let Some(deadline) = self.deadline {
            record.deadline = deadline;
        }
        if let Some(ref organizer) = self.organizer {
            record.organizer = organizer.clone();
        }
        if let Some(finalized) = self.finalized {
            record.finalized = finalized;
        }
        if let Some(raised) = self.raised {
            record.raised = raised;
        }
        if let Some(bid_count) = self.bid_count {
            record.bid_count = bid_count;
        }
    }

    /// Whether the ledger record already shows every field of this patch.
    ///
    /// `bid_count` only grows, so a remote count at or above the expected one
    /// counts as reflected even when other bids landed in between. `raised`
    /// with a known starting point is reflected once the remote total has
    /// moved at least as far in the same direction.
    pub fn is_reflected_in(&self, record: &Record) -> bool {
        self.title.as_ref().map_or(true, |v| *v == record.title)
            && self.description.as_ref().map_or(true, |v| *v == record.description)
            && self.goal.map_or(true, |v| v == record.goal)
            && self.deadline.map_or(true, |v| v == record.deadline)
            && self.organizer.as_ref().map_or(true, |v| *v == record.organizer)
            && self.finalized.map_or(true, |v| v == record.finalized)
            && self.raised.map_or(true, |v| match self.raised_from {
                Some(from) if v >= from => record.raised >= v,
                Some(_) => record.raised <= v,
                None => record.raised == v,
            })
            && self.bid_count.map_or(true, |v| record.bid_count >= v)
    }

    /// Placeholder record for a tender that has not reached the ledger yet.
    pub fn to_placeholder(&self, id: RecordId) -> Record {
        let mut record = Record {
            id,
            title: String::new(),
            description: String::new(),
            goal: 0,
            deadline: 0,
            organizer: Address::default(),
            finalized: false,
            raised: 0,
            bid_count: 0,
        };
        self.apply_to(&mut record);
        record
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Role {
    #[default]
    User = 0,
    Admin = 1,
}

impl Role {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::User),
            1 => Some(Self::Admin),
            _ => None,
        }
    }
}

/// The connected account as the ledger sees it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub address: Address,
    pub role: Role,
    pub has_subscription: bool,
}

impl AccountProfile {
    /// Admins bid without a subscription.
    pub fn may_bid(&self) -> bool {
        self.role == Role::Admin || self.has_subscription
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub bidder: Address,
    #[serde(with = "wei")]
    pub price: u128,
    pub quality: u8,
    pub days_required: u16,
}

/// Result of pinning off-record content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PinnedContent {
    pub content_id: String,
    /// Hex-encoded BLAKE3 digest of the uploaded bytes.
    pub content_hash: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ActionId(pub Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateRecord,
    SubmitBid,
    Contribute,
    Finalize,
    Refund,
    AdminOp,
    BuySubscription,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateRecord => "create_record",
            ActionKind::SubmitBid => "submit_bid",
            ActionKind::Contribute => "contribute",
            ActionKind::Finalize => "finalize",
            ActionKind::Refund => "refund",
            ActionKind::AdminOp => "admin_op",
            ActionKind::BuySubscription => "buy_subscription",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
