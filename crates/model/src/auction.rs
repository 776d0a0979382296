use {
    crate::{AuctionId, BidId, ListingId, UserId},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Duration, Utc},
    serde::{Deserialize, Serialize},
    strum::EnumString,
};

#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash, Default, EnumString)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "camelCase")]
pub enum AuctionStatus {
    #[default]
    Scheduled,
    Active,
    /// Closed without a winner (no bids, or reserve price not met).
    Ended,
    /// Closed with a winner.
    Completed,
    Cancelled,
}

impl AuctionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Completed | Self::Cancelled)
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash, Default, EnumString)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "camelCase")]
pub enum AuctionType {
    #[default]
    English,
    SealedBid,
}

#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: AuctionId,
    pub listing_id: ListingId,
    pub seller_id: UserId,
    pub auction_type: AuctionType,
    pub status: AuctionStatus,
    pub starting_price: BigDecimal,
    pub current_price: BigDecimal,
    pub reserve_price: Option<BigDecimal>,
    pub buy_now_price: Option<BigDecimal>,
    pub min_bid_increment: BigDecimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub auto_extend: bool,
    pub extension_minutes: i32,
    pub extension_threshold_minutes: i32,
    pub max_extensions: i32,
    pub times_extended: i32,
    pub requires_deposit: bool,
    pub deposit_amount: Option<BigDecimal>,
    pub deposit_percentage: Option<BigDecimal>,
    pub winner_id: Option<UserId>,
    pub winning_bid_id: Option<BidId>,
    pub total_bids: i32,
    pub unique_bidders: i32,
    /// Optimistic concurrency token. Bumped by every compound write; writers
    /// that lose a race observe a stale version and must re-read.
    pub version: i64,
}

impl Auction {
    /// The lowest amount the next bid has to reach. The opening bid only has
    /// to match the starting price; afterwards each bid must top the current
    /// price by the configured increment.
    pub fn minimum_bid(&self) -> BigDecimal {
        if self.total_bids == 0 {
            self.starting_price.clone()
        } else {
            &self.current_price + &self.min_bid_increment
        }
    }

    /// The deposit a bidder owes to participate: the fixed amount if one is
    /// configured, otherwise a percentage of the current price (10% unless
    /// overridden).
    pub fn deposit_due(&self) -> BigDecimal {
        if let Some(amount) = &self.deposit_amount {
            return amount.clone();
        }
        let percentage = self
            .deposit_percentage
            .clone()
            .unwrap_or_else(|| BigDecimal::from(10));
        &self.current_price * percentage / BigDecimal::from(100)
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.end_time
    }

    /// Whether a bid admitted at `now` falls into the anti-snipe window and
    /// the extension budget is not yet exhausted.
    pub fn extension_applies(&self, now: DateTime<Utc>) -> bool {
        self.auto_extend
            && self.times_extended < self.max_extensions
            && self.end_time - now <= Duration::minutes(self.extension_threshold_minutes.into())
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Default, Deserialize, Serialize, EnumString)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "camelCase")]
pub enum AuctionSort {
    #[default]
    EndingSoon,
    NewlyListed,
    PriceAscending,
    PriceDescending,
}

/// Typed query parameters for listing auctions.
#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuctionFilter {
    pub status: Option<AuctionStatus>,
    pub auction_type: Option<AuctionType>,
    pub seller_id: Option<UserId>,
    pub min_price: Option<BigDecimal>,
    pub max_price: Option<BigDecimal>,
    pub sort: AuctionSort,
    pub offset: i64,
    pub limit: Option<i64>,
}
