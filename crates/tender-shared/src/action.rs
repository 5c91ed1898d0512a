//! Typed action requests, their local validation, their expected effect on
//! a record, and the contract call each one becomes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{
    MAX_BID_DAYS, MAX_BID_QUALITY, MAX_TENDER_DURATION_DAYS, MIN_BID_DAYS, SECONDS_PER_DAY,
};
use crate::error::{Result, SyncError};
use crate::types::{ActionKind, Address, PinnedContent, Record, RecordId, RecordPatch, Role};

/// Off-record content to pin before the action is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOp {
    AssignRole { address: Address, role: Role },
    SetSubscriptionPrice { price: u128 },
    WithdrawFunds,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    CreateTender {
        title: String,
        description: String,
        goal: u128,
        duration_days: u32,
        attachment: Option<Attachment>,
    },
    SubmitBid {
        tender: RecordId,
        price: u128,
        quality: u8,
        days_required: u16,
        attachment: Option<Attachment>,
    },
    Contribute {
        tender: RecordId,
        amount: u128,
    },
    Finalize {
        tender: RecordId,
    },
    /// `amount` is the caller's own contribution, used for the optimistic
    /// decrement of the raised total.
    Refund {
        tender: RecordId,
        amount: u128,
    },
    BuySubscription {
        price: u128,
    },
    Admin(AdminOp),
}

/// A write against the tender contract, as handed to the wallet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContractCall {
    pub method: String,
    pub args: Vec<Value>,
    /// Attached value in wei, as a decimal string on the wire.
    #[serde(with = "crate::types::wei")]
    pub value: u128,
}

impl ContractCall {
    fn new(method: &str, args: Vec<Value>) -> Self {
        Self {
            method: method.to_string(),
            args,
            value: 0,
        }
    }

    fn paying(mut self, value: u128) -> Self {
        self.value = value;
        self
    }
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::CreateTender { .. } => ActionKind::CreateRecord,
            ActionRequest::SubmitBid { .. } => ActionKind::SubmitBid,
            ActionRequest::Contribute { .. } => ActionKind::Contribute,
            ActionRequest::Finalize { .. } => ActionKind::Finalize,
            ActionRequest::Refund { .. } => ActionKind::Refund,
            ActionRequest::BuySubscription { .. } => ActionKind::BuySubscription,
            ActionRequest::Admin(_) => ActionKind::AdminOp,
        }
    }

    /// The tender this action touches; `None` for creation and account ops.
    pub fn target(&self) -> Option<RecordId> {
        match self {
            ActionRequest::SubmitBid { tender, .. }
            | ActionRequest::Contribute { tender, .. }
            | ActionRequest::Finalize { tender }
            | ActionRequest::Refund { tender, .. } => Some(*tender),
            _ => None,
        }
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        match self {
            ActionRequest::CreateTender { attachment, .. }
            | ActionRequest::SubmitBid { attachment, .. } => attachment.as_ref(),
            _ => None,
        }
    }

    /// Local preconditions. The contract enforces the real rules; this only
    /// catches what would obviously revert.
    pub fn validate(&self) -> Result<()> {
        match self {
            ActionRequest::CreateTender {
                title,
                description,
                goal,
                duration_days,
                ..
            } => {
                if title.trim().is_empty() || description.trim().is_empty() {
                    return invalid("title and description are required");
                }
                if *goal == 0 {
                    return invalid("goal must be positive");
                }
                if *duration_days == 0 || *duration_days > MAX_TENDER_DURATION_DAYS {
                    return invalid(format!(
                        "duration must be between 1 and {MAX_TENDER_DURATION_DAYS} days"
                    ));
                }
            }
            ActionRequest::SubmitBid {
                tender,
                price,
                quality,
                days_required,
                ..
            } => {
                ensure_remote(*tender)?;
                if *price == 0 {
                    return invalid("bid price must be positive");
                }
                if *quality > MAX_BID_QUALITY {
                    return invalid(format!("quality must be between 0 and {MAX_BID_QUALITY}"));
                }
                if !(MIN_BID_DAYS..=MAX_BID_DAYS).contains(days_required) {
                    return invalid(format!(
                        "days must be between {MIN_BID_DAYS} and {MAX_BID_DAYS}"
                    ));
                }
            }
            ActionRequest::Contribute { tender, amount } => {
                ensure_remote(*tender)?;
                if *amount == 0 {
                    return invalid("contribution must be positive");
                }
            }
            ActionRequest::Finalize { tender } | ActionRequest::Refund { tender, .. } => {
                ensure_remote(*tender)?;
            }
            ActionRequest::BuySubscription { price } => {
                if *price == 0 {
                    return invalid("subscription price is unknown");
                }
            }
            ActionRequest::Admin(AdminOp::SetSubscriptionPrice { price }) => {
                if *price == 0 {
                    return invalid("price must be positive");
                }
            }
            ActionRequest::Admin(AdminOp::AssignRole { .. })
            | ActionRequest::Admin(AdminOp::WithdrawFunds) => {}
        }
        Ok(())
    }

    /// What the target record should look like once this action lands.
    ///
    /// `current` is the record as last published, `sender` the connected
    /// account and `now` unix seconds.
    pub fn expected_effect(
        &self,
        current: Option<&Record>,
        sender: &Address,
        now: i64,
    ) -> RecordPatch {
        match self {
            ActionRequest::CreateTender {
                title,
                description,
                goal,
                duration_days,
                ..
            } => RecordPatch {
                title: Some(title.clone()),
                description: Some(description.clone()),
                goal: Some(*goal),
                deadline: Some(now + i64::from(*duration_days) * SECONDS_PER_DAY),
                organizer: Some(sender.clone()),
                finalized: Some(false),
                raised: Some(0),
                bid_count: Some(0),
                raised_from: None,
            },
            ActionRequest::SubmitBid { .. } => RecordPatch {
                bid_count: current.map(|r| r.bid_count + 1),
                ..Default::default()
            },
            ActionRequest::Contribute { amount, .. } => RecordPatch {
                raised: current.map(|r| r.raised.saturating_add(*amount)),
                raised_from: current.map(|r| r.raised),
                ..Default::default()
            },
            ActionRequest::Finalize { .. } => RecordPatch {
                finalized: Some(true),
                ..Default::default()
            },
            ActionRequest::Refund { amount, .. } => RecordPatch {
                raised: current.map(|r| r.raised.saturating_sub(*amount)),
                raised_from: current.map(|r| r.raised),
                ..Default::default()
            },
            ActionRequest::BuySubscription { .. } | ActionRequest::Admin(_) => {
                RecordPatch::default()
            }
        }
    }

    /// The contract call for this request. Pinned content, when present, is
    /// appended as `(contentId, contentHash)`.
    pub fn contract_call(&self, content: Option<&PinnedContent>) -> ContractCall {
        let call = match self {
            ActionRequest::CreateTender {
                title,
                description,
                goal,
                duration_days,
                ..
            } => ContractCall::new(
                "createTender",
                vec![
                    json!(title),
                    json!(description),
                    json!(goal.to_string()),
                    json!((i64::from(*duration_days) * SECONDS_PER_DAY).to_string()),
                ],
            ),
            ActionRequest::SubmitBid {
                tender,
                price,
                quality,
                days_required,
                ..
            } => ContractCall::new(
                "submitBid",
                vec![
                    json!(tender.0.to_string()),
                    json!(price.to_string()),
                    json!(quality.to_string()),
                    json!(days_required.to_string()),
                ],
            ),
            ActionRequest::Contribute { tender, amount } => {
                ContractCall::new("contribute", vec![json!(tender.0.to_string())]).paying(*amount)
            }
            ActionRequest::Finalize { tender } => {
                ContractCall::new("finalizeTender", vec![json!(tender.0.to_string())])
            }
            ActionRequest::Refund { tender, .. } => {
                ContractCall::new("refund", vec![json!(tender.0.to_string())])
            }
            ActionRequest::BuySubscription { price } => {
                ContractCall::new("buySubscription", vec![]).paying(*price)
            }
            ActionRequest::Admin(AdminOp::AssignRole { address, role }) => ContractCall::new(
                "assignRole",
                vec![json!(address.as_str()), json!(*role as u8)],
            ),
            ActionRequest::Admin(AdminOp::SetSubscriptionPrice { price }) => {
                ContractCall::new("setSubscriptionPrice", vec![json!(price.to_string())])
            }
            ActionRequest::Admin(AdminOp::WithdrawFunds) => {
                ContractCall::new("withdrawFunds", vec![])
            }
        };

        match content {
            Some(pinned) => {
                let mut call = call;
                call.args.push(json!(pinned.content_id));
                call.args.push(json!(pinned.content_hash));
                call
            }
            None => call,
        }
    }
}

fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(SyncError::InvalidPayload(msg.into()))
}

fn ensure_remote(id: RecordId) -> Result<()> {
    if id.is_placeholder() || id.0 == 0 {
        return invalid(format!("tender {id} is not on the ledger yet"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> Address {
        Address::parse("0x00000000000000000000000000000000000000aa").unwrap()
    }

    fn bid(quality: u8, days_required: u16) -> ActionRequest {
        ActionRequest::SubmitBid {
            tender: RecordId(5),
            price: 1,
            quality,
            days_required,
            attachment: None,
        }
    }

    #[test]
    fn test_bid_bounds() {
        assert!(bid(0, 1).validate().is_ok());
        assert!(bid(100, 365).validate().is_ok());
        assert!(matches!(bid(101, 10).validate(), Err(SyncError::InvalidPayload(_))));
        assert!(bid(50, 0).validate().is_err());
        assert!(bid(50, 366).validate().is_err());
    }

    #[test]
    fn test_create_requires_fields() {
        let req = ActionRequest::CreateTender {
            title: "  ".into(),
            description: "d".into(),
            goal: 1,
            duration_days: 3,
            attachment: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_placeholder_target_rejected() {
        let req = ActionRequest::Finalize {
            tender: RecordId(-1),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_create_effect_sets_deadline_from_duration() {
        let req = ActionRequest::CreateTender {
            title: "Bridge".into(),
            description: "Repaint".into(),
            goal: 500,
            duration_days: 2,
            attachment: None,
        };
        let patch = req.expected_effect(None, &sender(), 1_000);
        assert_eq!(patch.deadline, Some(1_000 + 2 * SECONDS_PER_DAY));
        assert_eq!(patch.organizer, Some(sender()));
        assert_eq!(req.kind(), ActionKind::CreateRecord);
        assert_eq!(req.target(), None);
    }

    #[test]
    fn test_bid_effect_increments_known_count() {
        let record = Record {
            id: RecordId(5),
            title: "t".into(),
            description: String::new(),
            goal: 1,
            deadline: 10,
            organizer: sender(),
            finalized: false,
            raised: 0,
            bid_count: 4,
        };
        let patch = bid(10, 10).expected_effect(Some(&record), &sender(), 0);
        assert_eq!(patch.bid_count, Some(5));
        assert!(bid(10, 10).expected_effect(None, &sender(), 0).is_empty());
    }

    #[test]
    fn test_contract_call_shapes() {
        let call = ActionRequest::Contribute {
            tender: RecordId(3),
            amount: 42,
        }
        .contract_call(None);
        assert_eq!(call.method, "contribute");
        assert_eq!(call.value, 42);

        let pinned = PinnedContent {
            content_id: "bafy".into(),
            content_hash: "ff".into(),
        };
        let call = bid(10, 10).contract_call(Some(&pinned));
        assert_eq!(call.method, "submitBid");
        assert_eq!(call.args.len(), 6);
        assert_eq!(call.args[4], json!("bafy"));
    }
}
