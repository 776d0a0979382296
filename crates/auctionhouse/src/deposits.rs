//! Deposit ledger: payment, refund, forfeiture and application of bidder
//! deposits. A deposit is "valid" while PAID or HELD; only valid deposits
//! satisfy the bidding gate and only valid deposits can move to a terminal
//! status.

use {
    crate::{
        clock::Now,
        database::{auctions::AuctionStoring, deposits::DepositStoring},
        notifications::{Event, Notifier},
    },
    anyhow::Result,
    model::{
        AuctionId,
        UserId,
        deposit::{Deposit, DepositStatus},
    },
    std::sync::Arc,
};

#[derive(Debug, thiserror::Error)]
pub enum DepositError {
    #[error("auction not found")]
    AuctionNotFound,
    #[error("auction is no longer accepting deposits")]
    AuctionClosed,
    #[error("auction does not require a deposit")]
    NotRequired,
    #[error("sellers do not pay deposits on their own auctions")]
    SelfDeposit,
    #[error("a valid deposit already exists")]
    AlreadyPaid,
    #[error("no valid deposit to settle")]
    NoValidDeposit,
    #[error("only the auction winner can apply their deposit")]
    NotWinner,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct DepositLedger {
    auctions: Arc<dyn AuctionStoring>,
    deposits: Arc<dyn DepositStoring>,
    clock: Arc<dyn Now>,
    notifier: Notifier,
}

impl DepositLedger {
    pub fn new(
        auctions: Arc<dyn AuctionStoring>,
        deposits: Arc<dyn DepositStoring>,
        clock: Arc<dyn Now>,
        notifier: Notifier,
    ) -> Self {
        Self {
            auctions,
            deposits,
            clock,
            notifier,
        }
    }

    /// Records a deposit payment. The amount is derived from the auction's
    /// deposit settings, never taken from the caller.
    pub async fn pay(
        &self,
        auction_id: AuctionId,
        user: UserId,
        method: String,
        reference: String,
    ) -> Result<Deposit, DepositError> {
        let auction = self
            .auctions
            .single_auction(auction_id)
            .await?
            .ok_or(DepositError::AuctionNotFound)?;
        if auction.status.is_terminal() {
            return Err(DepositError::AuctionClosed);
        }
        if !auction.requires_deposit {
            return Err(DepositError::NotRequired);
        }
        if user == auction.seller_id {
            return Err(DepositError::SelfDeposit);
        }
        let existing = self.deposits.deposit(auction_id, user).await?;
        if existing.is_some_and(|deposit| deposit.status.is_valid()) {
            return Err(DepositError::AlreadyPaid);
        }
        let deposit = Deposit {
            auction_id,
            user_id: user,
            amount: auction.deposit_due(),
            status: DepositStatus::Paid,
            method,
            reference,
            paid_at: self.clock.now(),
            refunded_at: None,
            forfeited_at: None,
            reason: None,
        };
        self.deposits.save_deposit(&deposit).await?;
        self.notifier.notify(
            user,
            Event::DepositPaid {
                auction_id,
                amount: deposit.amount.clone(),
            },
        );
        Ok(deposit)
    }

    pub async fn refund(
        &self,
        auction: AuctionId,
        user: UserId,
        reason: Option<String>,
    ) -> Result<(), DepositError> {
        let rows = self
            .deposits
            .transition_deposit(auction, user, DepositStatus::Refunded, reason, self.clock.now())
            .await?;
        if rows == 0 {
            return Err(DepositError::NoValidDeposit);
        }
        self.notifier
            .notify(user, Event::DepositRefunded { auction_id: auction });
        Ok(())
    }

    /// Forfeits a deposit, e.g. when the winner fails to complete the
    /// purchase.
    pub async fn forfeit(
        &self,
        auction: AuctionId,
        user: UserId,
        reason: Option<String>,
    ) -> Result<(), DepositError> {
        let rows = self
            .deposits
            .transition_deposit(
                auction,
                user,
                DepositStatus::Forfeited,
                reason.clone(),
                self.clock.now(),
            )
            .await?;
        if rows == 0 {
            return Err(DepositError::NoValidDeposit);
        }
        self.notifier.notify(
            user,
            Event::DepositForfeited {
                auction_id: auction,
                reason,
            },
        );
        Ok(())
    }

    /// Credits the winner's deposit toward the final price.
    pub async fn apply(&self, auction_id: AuctionId, user: UserId) -> Result<(), DepositError> {
        let auction = self
            .auctions
            .single_auction(auction_id)
            .await?
            .ok_or(DepositError::AuctionNotFound)?;
        if auction.winner_id != Some(user) {
            return Err(DepositError::NotWinner);
        }
        let rows = self
            .deposits
            .transition_deposit(
                auction_id,
                user,
                DepositStatus::Applied,
                None,
                self.clock.now(),
            )
            .await?;
        if rows == 0 {
            return Err(DepositError::NoValidDeposit);
        }
        Ok(())
    }

    pub async fn deposit(&self, auction: AuctionId, user: UserId) -> Result<Option<Deposit>> {
        self.deposits.deposit(auction, user).await
    }

    pub async fn auction_deposits(&self, auction: AuctionId) -> Result<Vec<Deposit>> {
        self.deposits.auction_deposits(auction).await
    }
}
