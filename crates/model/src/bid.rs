use {
    crate::{AuctionId, BidId, UserId},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    strum::EnumString,
};

#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash, Default, EnumString)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "camelCase")]
pub enum BidStatus {
    /// Admitted but not currently leading.
    #[default]
    Active,
    /// A later bid took the lead.
    Outbid,
    /// Currently leading an active auction.
    Winning,
    /// Won a completed auction. Terminal.
    Won,
    /// Lost a closed auction. Terminal.
    Lost,
    Cancelled,
}

/// A bid row. Immutable once created except for `status`. `created_at` is the
/// canonical tie-break for "who was leading first" comparisons.
#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub amount: BigDecimal,
    /// The amount of the leader this bid replaced, if any.
    pub previous_bid: Option<BigDecimal>,
    pub is_auto_bid: bool,
    /// Proxy ceiling. Only meaningful when `is_auto_bid` is set.
    pub max_auto_bid: Option<BigDecimal>,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
}

impl Bid {
    /// Whether this bid still competes for the lead of an active auction.
    pub fn is_competing(&self) -> bool {
        matches!(self.status, BidStatus::Active | BidStatus::Winning)
    }
}
