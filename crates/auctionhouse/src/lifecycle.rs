//! Auction lifecycle: creation, activation, closing and cancellation.
//!
//! Terminal transitions run through the same version guarded write as bid
//! admission, so a close racing an admission settles on exactly one of the
//! two outcomes and the loser re-reads and retries.

use {
    crate::{
        clock::Now,
        database::{
            StoreError,
            auctions::{AuctionOutcome, AuctionStoring},
            bids::BidRetrieving,
            deposits::DepositStoring,
            sealed_bids::SealedBidStoring,
        },
        notifications::{Event, Notifier},
    },
    anyhow::{Context, Result},
    bigdecimal::{BigDecimal, Zero},
    chrono::{DateTime, Utc},
    model::{
        AuctionId,
        UserId,
        auction::{Auction, AuctionStatus, AuctionType},
        bid::{Bid, BidStatus},
    },
    std::{collections::BTreeSet, sync::Arc},
};

const MAX_FINALIZE_ATTEMPTS: usize = 3;

#[derive(Clone, Debug)]
pub struct CreateAuctionRequest {
    pub listing_id: model::ListingId,
    pub seller_id: UserId,
    pub auction_type: AuctionType,
    pub starting_price: BigDecimal,
    pub reserve_price: Option<BigDecimal>,
    pub buy_now_price: Option<BigDecimal>,
    pub min_bid_increment: BigDecimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub auto_extend: bool,
    pub extension_minutes: i32,
    pub extension_threshold_minutes: i32,
    pub max_extensions: i32,
    pub requires_deposit: bool,
    pub deposit_amount: Option<BigDecimal>,
    pub deposit_percentage: Option<BigDecimal>,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateAuctionError {
    #[error("{0}")]
    InvalidArgument(&'static str),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    #[error("auction not found")]
    NotFound,
    #[error("auction is still running")]
    StillRunning,
    #[error("sealed-bid auctions close through winner determination")]
    SealedBid,
    #[error("auction is processing other updates, try again")]
    Contended,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum EndAuctionError {
    #[error("auction not found")]
    NotFound,
    #[error("only the seller may end an auction")]
    Forbidden,
    #[error("auction cannot be ended in its current state")]
    InvalidState,
    #[error("auction is processing other updates, try again")]
    Contended,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum BuyNowError {
    #[error("auction not found")]
    NotFound,
    #[error("auction has no buy-now price")]
    Unavailable,
    #[error("auction has not started yet")]
    NotStarted,
    #[error("auction has ended")]
    Ended,
    #[error("sellers cannot buy their own listings")]
    SelfPurchase,
    #[error("auction is processing other updates, try again")]
    Contended,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    #[error("auction not found")]
    NotFound,
    #[error("only the seller may cancel an auction")]
    Forbidden,
    #[error("auctions with bids cannot be cancelled")]
    HasBids,
    #[error("auction cannot be cancelled in its current state")]
    InvalidState,
    #[error("auction is processing other updates, try again")]
    Contended,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct Lifecycle {
    auctions: Arc<dyn AuctionStoring>,
    bids: Arc<dyn BidRetrieving>,
    deposits: Arc<dyn DepositStoring>,
    sealed_bids: Arc<dyn SealedBidStoring>,
    clock: Arc<dyn Now>,
    notifier: Notifier,
}

impl Lifecycle {
    pub fn new(
        auctions: Arc<dyn AuctionStoring>,
        bids: Arc<dyn BidRetrieving>,
        deposits: Arc<dyn DepositStoring>,
        sealed_bids: Arc<dyn SealedBidStoring>,
        clock: Arc<dyn Now>,
        notifier: Notifier,
    ) -> Self {
        Self {
            auctions,
            bids,
            deposits,
            sealed_bids,
            clock,
            notifier,
        }
    }

    pub async fn create_auction(
        &self,
        request: &CreateAuctionRequest,
    ) -> Result<Auction, CreateAuctionError> {
        let now = self.clock.now();
        validate_create(request, now)?;
        let status = if request.start_time <= now {
            AuctionStatus::Active
        } else {
            AuctionStatus::Scheduled
        };
        let auction = Auction {
            id: 0,
            listing_id: request.listing_id,
            seller_id: request.seller_id,
            auction_type: request.auction_type,
            status,
            starting_price: request.starting_price.clone(),
            current_price: request.starting_price.clone(),
            reserve_price: request.reserve_price.clone(),
            buy_now_price: request.buy_now_price.clone(),
            min_bid_increment: request.min_bid_increment.clone(),
            start_time: request.start_time,
            end_time: request.end_time,
            actual_end_time: None,
            auto_extend: request.auto_extend,
            extension_minutes: request.extension_minutes,
            extension_threshold_minutes: request.extension_threshold_minutes,
            max_extensions: request.max_extensions,
            times_extended: 0,
            requires_deposit: request.requires_deposit,
            deposit_amount: request.deposit_amount.clone(),
            deposit_percentage: request.deposit_percentage.clone(),
            winner_id: None,
            winning_bid_id: None,
            total_bids: 0,
            unique_bidders: 0,
            version: 0,
        };
        let id = self
            .auctions
            .create_auction(&auction)
            .await
            .context("create auction")?;
        Ok(Auction { id, ..auction })
    }

    /// Closes an expired open auction. Idempotent: closing an already
    /// terminal auction is a no-op returning the current state. Invoked by
    /// the maintenance sweep and lazily on reads.
    pub async fn close(&self, id: AuctionId) -> Result<Auction, CloseError> {
        for _ in 0..MAX_FINALIZE_ATTEMPTS {
            let auction = self
                .auctions
                .single_auction(id)
                .await?
                .ok_or(CloseError::NotFound)?;
            if auction.status.is_terminal() {
                return Ok(auction);
            }
            if auction.auction_type == AuctionType::SealedBid {
                return Err(CloseError::SealedBid);
            }
            let now = self.clock.now();
            if auction.status != AuctionStatus::Active || !auction.has_expired(now) {
                return Err(CloseError::StillRunning);
            }
            match self.finish(&auction, now).await {
                Ok(auction) => return Ok(auction),
                Err(FinishError::Contended) => continue,
                Err(FinishError::Other(err)) => return Err(err.into()),
            }
        }
        Err(CloseError::Contended)
    }

    /// Lets the seller end a running open auction before its end time. The
    /// current leader wins, subject to the reserve price.
    pub async fn end_auction(
        &self,
        id: AuctionId,
        seller: UserId,
    ) -> Result<Auction, EndAuctionError> {
        for _ in 0..MAX_FINALIZE_ATTEMPTS {
            let auction = self
                .auctions
                .single_auction(id)
                .await?
                .ok_or(EndAuctionError::NotFound)?;
            if auction.seller_id != seller {
                return Err(EndAuctionError::Forbidden);
            }
            if auction.status != AuctionStatus::Active
                || auction.auction_type != AuctionType::English
            {
                return Err(EndAuctionError::InvalidState);
            }
            match self.finish(&auction, self.clock.now()).await {
                Ok(auction) => return Ok(auction),
                Err(FinishError::Contended) => continue,
                Err(FinishError::Other(err)) => return Err(err.into()),
            }
        }
        Err(EndAuctionError::Contended)
    }

    /// Immediate purchase at the configured buy-now price. Ends the auction
    /// with the buyer as winner; every open bid loses.
    pub async fn buy_now(&self, id: AuctionId, buyer: UserId) -> Result<Bid, BuyNowError> {
        for _ in 0..MAX_FINALIZE_ATTEMPTS {
            let now = self.clock.now();
            let auction = self
                .auctions
                .single_auction(id)
                .await?
                .ok_or(BuyNowError::NotFound)?;
            match auction.status {
                AuctionStatus::Active => {}
                AuctionStatus::Scheduled => return Err(BuyNowError::NotStarted),
                _ => return Err(BuyNowError::Ended),
            }
            if !auction.has_started(now) {
                return Err(BuyNowError::NotStarted);
            }
            if auction.has_expired(now) {
                return Err(BuyNowError::Ended);
            }
            let price = auction
                .buy_now_price
                .clone()
                .ok_or(BuyNowError::Unavailable)?;
            if buyer == auction.seller_id {
                return Err(BuyNowError::SelfPurchase);
            }
            let competing = self.bids.competing_bids(id).await?;
            let outcome = AuctionOutcome {
                auction_id: id,
                expected_version: auction.version,
                status: AuctionStatus::Completed,
                actual_end_time: now,
                winner_id: Some(buyer),
                winning_bid_id: None,
                insert_winning_bid: Some(Bid {
                    id: 0,
                    auction_id: id,
                    bidder_id: buyer,
                    amount: price.clone(),
                    previous_bid: competing.first().map(|bid| bid.amount.clone()),
                    is_auto_bid: false,
                    max_auto_bid: None,
                    status: BidStatus::Won,
                    created_at: now,
                }),
                final_price: Some(price.clone()),
            };
            let bid = match self.auctions.finalize_auction(&outcome).await {
                Ok(bid) => bid.context("buy-now outcome carried no bid")?,
                Err(StoreError::Contended) => continue,
                Err(StoreError::Database(err)) => return Err(anyhow::Error::from(err).into()),
            };
            Metrics::get().buy_now_sales.inc();
            self.settle(&auction, AuctionStatus::Completed, Some(buyer), Some(price), now)
                .await;
            return Ok(bid);
        }
        Err(BuyNowError::Contended)
    }

    /// Cancels an auction that has not attracted any bids yet.
    pub async fn cancel(
        &self,
        id: AuctionId,
        seller: UserId,
        reason: Option<String>,
    ) -> Result<Auction, CancelError> {
        for _ in 0..MAX_FINALIZE_ATTEMPTS {
            let now = self.clock.now();
            let auction = self
                .auctions
                .single_auction(id)
                .await?
                .ok_or(CancelError::NotFound)?;
            if auction.seller_id != seller {
                return Err(CancelError::Forbidden);
            }
            if auction.status.is_terminal() {
                return Err(CancelError::InvalidState);
            }
            if auction.total_bids > 0 {
                return Err(CancelError::HasBids);
            }
            if auction.auction_type == AuctionType::SealedBid
                && !self.sealed_bids.sealed_bids(id).await?.is_empty()
            {
                return Err(CancelError::HasBids);
            }
            let outcome = AuctionOutcome {
                auction_id: id,
                expected_version: auction.version,
                status: AuctionStatus::Cancelled,
                actual_end_time: now,
                winner_id: None,
                winning_bid_id: None,
                insert_winning_bid: None,
                final_price: None,
            };
            match self.auctions.finalize_auction(&outcome).await {
                Ok(_) => {}
                Err(StoreError::Contended) => continue,
                Err(StoreError::Database(err)) => return Err(anyhow::Error::from(err).into()),
            }
            Metrics::get().auctions_cancelled.inc();
            // Nobody won; every deposit goes back.
            if let Err(err) = self.deposits.refund_non_winners(id, None, now).await {
                tracing::error!(?err, auction = id, "failed to refund deposits on cancel");
            }
            self.notifier.notify(
                auction.seller_id,
                Event::AuctionCancelled {
                    auction_id: id,
                    reason,
                },
            );
            return self
                .auctions
                .single_auction(id)
                .await?
                .ok_or(CancelError::NotFound);
        }
        Err(CancelError::Contended)
    }

    /// Activates every scheduled auction whose start time has been reached.
    pub async fn activate_due(&self) -> Result<usize> {
        let now = self.clock.now();
        let due = self.auctions.auctions_due_to_start(now).await?;
        let mut started = 0;
        for auction in due {
            match self.auctions.start_auction(auction.id, auction.version).await {
                Ok(()) => started += 1,
                Err(StoreError::Contended) => {
                    // Someone else got there first; the next sweep re-checks.
                    tracing::debug!(auction = auction.id, "skipping contended activation");
                }
                Err(StoreError::Database(err)) => return Err(err.into()),
            }
        }
        Ok(started)
    }

    /// Closes every expired open auction. Sealed-bid auctions settle through
    /// the vault instead.
    pub async fn close_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let expired = self.auctions.expired_auctions(now).await?;
        let mut closed = 0;
        for auction in expired
            .iter()
            .filter(|auction| auction.auction_type == AuctionType::English)
        {
            match self.close(auction.id).await {
                Ok(_) => closed += 1,
                Err(err) => {
                    tracing::error!(?err, auction = auction.id, "failed to close expired auction")
                }
            }
        }
        Ok(closed)
    }

    async fn finish(
        &self,
        auction: &Auction,
        now: DateTime<Utc>,
    ) -> Result<Auction, FinishError> {
        let competing = self
            .bids
            .competing_bids(auction.id)
            .await
            .map_err(FinishError::Other)?;
        let winning = competing
            .iter()
            .find(|bid| bid.status == BidStatus::Winning);
        let reserve_met = auction
            .reserve_price
            .as_ref()
            .is_none_or(|reserve| winning.is_some_and(|bid| bid.amount >= *reserve));
        let (status, winner) = match winning {
            Some(bid) if reserve_met => (AuctionStatus::Completed, Some(bid)),
            _ => (AuctionStatus::Ended, None),
        };
        let outcome = AuctionOutcome {
            auction_id: auction.id,
            expected_version: auction.version,
            status,
            actual_end_time: now,
            winner_id: winner.map(|bid| bid.bidder_id),
            winning_bid_id: winner.map(|bid| bid.id),
            insert_winning_bid: None,
            final_price: None,
        };
        match self.auctions.finalize_auction(&outcome).await {
            Ok(_) => {}
            Err(StoreError::Contended) => return Err(FinishError::Contended),
            Err(StoreError::Database(err)) => return Err(FinishError::Other(err.into())),
        }
        Metrics::get().auctions_closed.inc();
        self.settle(
            auction,
            status,
            winner.map(|bid| bid.bidder_id),
            winner.map(|bid| bid.amount.clone()),
            now,
        )
        .await;
        self.auctions
            .single_auction(auction.id)
            .await
            .map_err(FinishError::Other)?
            .ok_or_else(|| FinishError::Other(anyhow::anyhow!("auction vanished while closing")))
    }

    /// Post-close effects: losing deposits go back and everyone involved
    /// hears about the outcome. Failures here are logged, never surfaced;
    /// the terminal transition already committed.
    async fn settle(
        &self,
        auction: &Auction,
        status: AuctionStatus,
        winner: Option<UserId>,
        winning_amount: Option<BigDecimal>,
        now: DateTime<Utc>,
    ) {
        // A missing winner refunds every deposit.
        if let Err(err) = self
            .deposits
            .refund_non_winners(auction.id, winner, now)
            .await
        {
            tracing::error!(?err, auction = auction.id, "failed to refund losing deposits");
        }
        self.notifier.notify(
            auction.seller_id,
            Event::AuctionEnded {
                auction_id: auction.id,
                status,
            },
        );
        if let (Some(winner), Some(amount)) = (winner, winning_amount) {
            self.notifier.notify(
                winner,
                Event::AuctionWon {
                    auction_id: auction.id,
                    amount,
                },
            );
        }
        match self.bids.auction_bids(auction.id).await {
            Ok(bids) => {
                let losers: BTreeSet<_> = bids
                    .iter()
                    .map(|bid| bid.bidder_id)
                    .filter(|bidder| Some(*bidder) != winner)
                    .collect();
                for bidder in losers {
                    self.notifier.notify(
                        bidder,
                        Event::AuctionLost {
                            auction_id: auction.id,
                        },
                    );
                }
            }
            Err(err) => {
                tracing::warn!(?err, auction = auction.id, "failed to notify losing bidders")
            }
        }
    }
}

enum FinishError {
    Contended,
    Other(anyhow::Error),
}

fn validate_create(
    request: &CreateAuctionRequest,
    now: DateTime<Utc>,
) -> Result<(), CreateAuctionError> {
    let invalid = CreateAuctionError::InvalidArgument;
    if request.starting_price <= BigDecimal::zero() {
        return Err(invalid("starting price must be positive"));
    }
    if request.min_bid_increment <= BigDecimal::zero() {
        return Err(invalid("bid increment must be positive"));
    }
    if request.end_time <= request.start_time {
        return Err(invalid("end time must be after start time"));
    }
    if request.end_time <= now {
        return Err(invalid("end time must be in the future"));
    }
    if let Some(reserve) = &request.reserve_price {
        if *reserve < request.starting_price {
            return Err(invalid("reserve price must not be below the starting price"));
        }
    }
    if let Some(buy_now) = &request.buy_now_price {
        if *buy_now <= request.starting_price {
            return Err(invalid("buy-now price must exceed the starting price"));
        }
    }
    if request.extension_minutes < 0
        || request.extension_threshold_minutes < 0
        || request.max_extensions < 0
    {
        return Err(invalid("extension settings must not be negative"));
    }
    if let Some(percentage) = &request.deposit_percentage {
        if *percentage <= BigDecimal::zero() || *percentage > BigDecimal::from(100) {
            return Err(invalid("deposit percentage must be within (0, 100]"));
        }
    }
    if let Some(amount) = &request.deposit_amount {
        if *amount <= BigDecimal::zero() {
            return Err(invalid("deposit amount must be positive"));
        }
    }
    Ok(())
}

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "lifecycle")]
struct Metrics {
    /// Number of auctions closed at their end time.
    auctions_closed: prometheus::IntCounter,

    /// Number of buy-now purchases.
    buy_now_sales: prometheus::IntCounter,

    /// Number of auctions cancelled by their seller.
    auctions_cancelled: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}
