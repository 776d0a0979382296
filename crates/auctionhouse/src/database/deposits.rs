use {
    super::{
        Postgres,
        conversions::{deposit_from_row, deposit_into_row, deposit_status_into},
    },
    anyhow::Result,
    chrono::{DateTime, Utc},
    model::{
        AuctionId,
        UserId,
        deposit::{Deposit, DepositStatus},
    },
};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait DepositStoring: Send + Sync {
    async fn deposit(&self, auction: AuctionId, user: UserId) -> Result<Option<Deposit>>;

    async fn auction_deposits(&self, auction: AuctionId) -> Result<Vec<Deposit>>;

    /// Inserts the deposit or replaces a terminal one. The caller checks
    /// there is no still-valid deposit first.
    async fn save_deposit(&self, deposit: &Deposit) -> Result<()>;

    /// Moves a valid (paid/held) deposit to a terminal status. Returns the
    /// number of affected rows; 0 means no valid deposit existed.
    async fn transition_deposit(
        &self,
        auction: AuctionId,
        user: UserId,
        to: DepositStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<u64>;

    /// Refunds every valid deposit of the auction except the winner's.
    async fn refund_non_winners(
        &self,
        auction: AuctionId,
        winner: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<u64>;
}

#[async_trait::async_trait]
impl DepositStoring for Postgres {
    async fn deposit(&self, auction: AuctionId, user: UserId) -> Result<Option<Deposit>> {
        let mut ex = self.pool.acquire().await?;
        let row = database::deposits::single(&mut ex, auction, user).await?;
        Ok(row.map(deposit_from_row))
    }

    async fn auction_deposits(&self, auction: AuctionId) -> Result<Vec<Deposit>> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::deposits::for_auction(&mut ex, auction).await?;
        Ok(rows.into_iter().map(deposit_from_row).collect())
    }

    async fn save_deposit(&self, deposit: &Deposit) -> Result<()> {
        let mut ex = self.pool.acquire().await?;
        database::deposits::upsert(&mut ex, &deposit_into_row(deposit)).await?;
        Ok(())
    }

    async fn transition_deposit(
        &self,
        auction: AuctionId,
        user: UserId,
        to: DepositStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::deposits::transition(
            &mut ex,
            auction,
            user,
            deposit_status_into(to),
            reason.as_deref(),
            now,
        )
        .await?;
        Ok(rows)
    }

    async fn refund_non_winners(
        &self,
        auction: AuctionId,
        winner: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut ex = self.pool.acquire().await?;
        let rows = database::deposits::refund_non_winners(&mut ex, auction, winner, now).await?;
        Ok(rows)
    }
}
