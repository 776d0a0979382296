use {
    super::{
        Postgres,
        StoreError,
        conversions::{
            auction_from_row,
            auction_into_row,
            auction_status_into,
            bid_into_row,
        },
    },
    anyhow::{Context, Result},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    model::{
        AuctionId,
        BidId,
        UserId,
        auction::{Auction, AuctionFilter, AuctionSort, AuctionStatus},
        bid::{Bid, BidStatus},
    },
};

/// Everything a single admitted bid changes on an auction, applied as one
/// atomic write. The version guard makes concurrent admissions on the same
/// auction mutually exclusive.
#[derive(Clone, Debug)]
pub struct BidAdmission {
    pub auction_id: AuctionId,
    pub expected_version: i64,
    /// The new bid; its id is assigned by the store.
    pub bid: Bid,
    pub new_current_price: BigDecimal,
    /// Set when the anti-snipe window pushed the end time out.
    pub new_end_time: Option<DateTime<Utc>>,
    pub times_extended: i32,
}

/// Terminal transition of an auction, applied as one atomic write.
#[derive(Clone, Debug)]
pub struct AuctionOutcome {
    pub auction_id: AuctionId,
    pub expected_version: i64,
    pub status: AuctionStatus,
    pub actual_end_time: DateTime<Utc>,
    pub winner_id: Option<UserId>,
    /// An existing bid that won the auction.
    pub winning_bid_id: Option<BidId>,
    /// A bid to insert as the winner in the same transaction; this is how
    /// buy-now closes an auction. Mutually exclusive with `winning_bid_id`.
    pub insert_winning_bid: Option<Bid>,
    /// Overrides the current price, e.g. the buy-now price or the winning
    /// sealed amount.
    pub final_price: Option<BigDecimal>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait AuctionStoring: Send + Sync {
    async fn create_auction(&self, auction: &Auction) -> Result<AuctionId>;

    async fn single_auction(&self, id: AuctionId) -> Result<Option<Auction>>;

    async fn auctions(&self, filter: &AuctionFilter) -> Result<Vec<Auction>>;

    async fn user_auctions(&self, seller: UserId) -> Result<Vec<Auction>>;

    /// Active auctions whose end time has passed.
    async fn expired_auctions(&self, now: DateTime<Utc>) -> Result<Vec<Auction>>;

    /// Scheduled auctions whose start time has been reached.
    async fn auctions_due_to_start(&self, now: DateTime<Utc>) -> Result<Vec<Auction>>;

    async fn start_auction(&self, id: AuctionId, expected_version: i64)
    -> Result<(), StoreError>;

    /// Applies an admitted bid: demotes the previous leaders, inserts the new
    /// bid and updates price, counters and end time in one transaction.
    /// Returns the stored bid with its assigned id.
    async fn record_bid(&self, admission: &BidAdmission) -> Result<Bid, StoreError>;

    /// Moves an auction to a terminal status and settles the bid statuses.
    /// Returns the inserted winning bid when the outcome carried one.
    async fn finalize_auction(&self, outcome: &AuctionOutcome) -> Result<Option<Bid>, StoreError>;
}

fn order_by(sort: AuctionSort) -> &'static str {
    match sort {
        AuctionSort::EndingSoon => "end_time ASC",
        AuctionSort::NewlyListed => "id DESC",
        AuctionSort::PriceAscending => "current_price ASC",
        AuctionSort::PriceDescending => "current_price DESC",
    }
}

#[async_trait::async_trait]
impl AuctionStoring for Postgres {
    async fn create_auction(&self, auction: &Auction) -> Result<AuctionId> {
        let mut ex = self.pool.acquire().await?;
        let id = database::auctions::insert(&mut ex, &auction_into_row(auction))
            .await
            .context("insert auction")?;
        Ok(id)
    }

    async fn single_auction(&self, id: AuctionId) -> Result<Option<Auction>> {
        let mut ex = self.pool.acquire().await?;
        let row = database::auctions::single(&mut ex, id).await?;
        Ok(row.map(auction_from_row))
    }

    async fn auctions(&self, filter: &AuctionFilter) -> Result<Vec<Auction>> {
        let mut ex = self.pool.acquire().await?;
        let db_filter = database::auctions::Filter {
            status: filter.status.map(auction_status_into),
            auction_type: filter
                .auction_type
                .map(super::conversions::auction_type_into),
            seller_id: filter.seller_id,
            min_price: filter.min_price.clone(),
            max_price: filter.max_price.clone(),
            order_by: order_by(filter.sort),
            offset: filter.offset,
            limit: filter.limit,
        };
        let rows = database::auctions::list(&mut ex, &db_filter).await?;
        Ok(rows.into_iter().map(auction_from_row).collect())
    }

    async fn user_auctions(&self, seller: UserId) -> Result<Vec<Auction>> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::auctions::user_auctions(&mut ex, seller).await?;
        Ok(rows.into_iter().map(auction_from_row).collect())
    }

    async fn expired_auctions(&self, now: DateTime<Utc>) -> Result<Vec<Auction>> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::auctions::expired(&mut ex, now).await?;
        Ok(rows.into_iter().map(auction_from_row).collect())
    }

    async fn auctions_due_to_start(&self, now: DateTime<Utc>) -> Result<Vec<Auction>> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::auctions::due_to_start(&mut ex, now).await?;
        Ok(rows.into_iter().map(auction_from_row).collect())
    }

    async fn start_auction(
        &self,
        id: AuctionId,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::auctions::set_active(&mut ex, id, expected_version).await?;
        if rows == 0 {
            return Err(StoreError::Contended);
        }
        Ok(())
    }

    async fn record_bid(&self, admission: &BidAdmission) -> Result<Bid, StoreError> {
        let mut tx = self.pool.begin().await?;
        let rows = database::auctions::update_for_bid(
            &mut tx,
            admission.auction_id,
            admission.expected_version,
            &admission.new_current_price,
            admission.new_end_time,
            admission.times_extended,
        )
        .await?;
        if rows == 0 {
            // Dropping the transaction rolls it back.
            return Err(StoreError::Contended);
        }
        database::bids::outbid_competing(&mut tx, admission.auction_id).await?;
        let id = database::bids::insert(&mut tx, &bid_into_row(&admission.bid)).await?;
        database::auctions::recount_bids(&mut tx, admission.auction_id).await?;
        tx.commit().await?;
        Ok(Bid {
            id,
            ..admission.bid.clone()
        })
    }

    async fn finalize_auction(&self, outcome: &AuctionOutcome) -> Result<Option<Bid>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut winning_bid_id = outcome.winning_bid_id;
        let mut inserted = None;
        if let Some(bid) = &outcome.insert_winning_bid {
            database::bids::outbid_competing(&mut tx, outcome.auction_id).await?;
            let id = database::bids::insert(&mut tx, &bid_into_row(bid)).await?;
            winning_bid_id = Some(id);
            inserted = Some(Bid { id, ..bid.clone() });
        }
        let rows = database::auctions::finalize(
            &mut tx,
            outcome.auction_id,
            outcome.expected_version,
            auction_status_into(outcome.status),
            outcome.actual_end_time,
            outcome.winner_id,
            winning_bid_id,
            outcome.final_price.as_ref(),
        )
        .await?;
        if rows == 0 {
            return Err(StoreError::Contended);
        }
        if let Some(id) = winning_bid_id {
            database::bids::set_status(&mut tx, id, database::bids::BidStatus::Won).await?;
        }
        database::bids::mark_losers(&mut tx, outcome.auction_id, winning_bid_id).await?;
        if inserted.is_some() {
            database::auctions::recount_bids(&mut tx, outcome.auction_id).await?;
        }
        tx.commit().await?;
        Ok(inserted.map(|bid| Bid {
            status: BidStatus::Won,
            ..bid
        }))
    }
}
