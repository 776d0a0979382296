use {
    super::{Postgres, conversions::bid_from_row},
    anyhow::Result,
    model::{AuctionId, UserId, bid::Bid},
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait BidRetrieving: Send + Sync {
    /// All bids of an auction, newest first.
    async fn auction_bids(&self, auction: AuctionId) -> Result<Vec<Bid>>;

    /// Bids still competing for the lead, best first.
    async fn competing_bids(&self, auction: AuctionId) -> Result<Vec<Bid>>;

    /// All bids of a user across auctions, newest first.
    async fn user_bids(&self, user: UserId) -> Result<Vec<Bid>>;
}

#[async_trait::async_trait]
impl BidRetrieving for Postgres {
    async fn auction_bids(&self, auction: AuctionId) -> Result<Vec<Bid>> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::bids::auction_bids(&mut ex, auction).await?;
        Ok(rows.into_iter().map(bid_from_row).collect())
    }

    async fn competing_bids(&self, auction: AuctionId) -> Result<Vec<Bid>> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::bids::competing_bids(&mut ex, auction).await?;
        Ok(rows.into_iter().map(bid_from_row).collect())
    }

    async fn user_bids(&self, user: UserId) -> Result<Vec<Bid>> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::bids::user_bids(&mut ex, user).await?;
        Ok(rows.into_iter().map(bid_from_row).collect())
    }
}
