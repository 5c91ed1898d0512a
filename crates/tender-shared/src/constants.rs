/// Seconds in one hour.
pub const SECONDS_PER_HOUR: i64 = 3_600;

/// Seconds in one day. Also the "ending soon" threshold.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Wei per ether (10^18).
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

/// A tender with more bids than this is highlighted as busy.
pub const MANY_BIDS_THRESHOLD: u64 = 5;

/// Progress at or above this percentage is highlighted as almost funded.
pub const ALMOST_FUNDED_PERCENT: u8 = 80;

/// Bid quality score bounds (inclusive).
pub const MAX_BID_QUALITY: u8 = 100;

/// Delivery time bounds for a bid, in days (inclusive).
pub const MIN_BID_DAYS: u16 = 1;
pub const MAX_BID_DAYS: u16 = 365;

/// Upper bound accepted for a new tender's duration, in days.
pub const MAX_TENDER_DURATION_DAYS: u32 = 3_650;

/// Contract method names of the canonical bid tender.
pub const METHOD_TENDER_COUNT: &str = "tenderCount";
pub const METHOD_TENDERS: &str = "tenders";
pub const METHOD_GET_BID_COUNT: &str = "getBidCount";
pub const METHOD_GET_BIDS: &str = "getBids";
pub const METHOD_GET_ROLE: &str = "getRole";
pub const METHOD_HAS_SUBSCRIPTION: &str = "hasActiveSubscription";
pub const METHOD_SUBSCRIPTION_PRICE: &str = "subscriptionPrice";
