use {
    super::{
        InsertionError,
        Postgres,
        conversions::{sealed_bid_from_row, sealed_bid_into_row},
    },
    anyhow::Result,
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    model::{AuctionId, UserId, sealed_bid::SealedBid},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SealedBidStoring: Send + Sync {
    /// Stores a sealed bid. The unique (auction, bidder) constraint enforces
    /// the one-bid-per-user rule.
    async fn insert_sealed_bid(&self, bid: &SealedBid) -> Result<(), InsertionError>;

    /// All sealed bids of an auction in submission order.
    async fn sealed_bids(&self, auction: AuctionId) -> Result<Vec<SealedBid>>;

    async fn has_sealed_bid(&self, auction: AuctionId, bidder: UserId) -> Result<bool>;

    /// Persists the decrypted amount. Already revealed rows are untouched.
    async fn store_reveal(
        &self,
        auction: AuctionId,
        bidder: UserId,
        amount: &BigDecimal,
        now: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait::async_trait]
impl SealedBidStoring for Postgres {
    async fn insert_sealed_bid(&self, bid: &SealedBid) -> Result<(), InsertionError> {
        let mut ex = self
            .pool
            .acquire()
            .await
            .map_err(InsertionError::DbError)?;
        database::sealed_bids::insert(&mut ex, &sealed_bid_into_row(bid)).await?;
        Ok(())
    }

    async fn sealed_bids(&self, auction: AuctionId) -> Result<Vec<SealedBid>> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::sealed_bids::for_auction(&mut ex, auction).await?;
        Ok(rows.into_iter().map(sealed_bid_from_row).collect())
    }

    async fn has_sealed_bid(&self, auction: AuctionId, bidder: UserId) -> Result<bool> {
        let mut ex = self.pool.acquire().await?;
        let exists = database::sealed_bids::exists(&mut ex, auction, bidder).await?;
        Ok(exists)
    }

    async fn store_reveal(
        &self,
        auction: AuctionId,
        bidder: UserId,
        amount: &BigDecimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut ex = self.pool.acquire().await?;
        database::sealed_bids::mark_revealed(&mut ex, auction, bidder, amount, now).await?;
        Ok(())
    }
}
