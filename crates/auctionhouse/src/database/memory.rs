//! In-memory store with the same semantics as the Postgres implementation,
//! including the version guard. Used by unit tests that exercise whole
//! services instead of mocking every storage call.

use {
    super::{InsertionError, StoreError},
    crate::database::{
        auctions::{AuctionOutcome, AuctionStoring, BidAdmission},
        bids::BidRetrieving,
        deposits::DepositStoring,
        sealed_bids::SealedBidStoring,
    },
    anyhow::Result,
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    model::{
        AuctionId,
        BidId,
        UserId,
        auction::{Auction, AuctionFilter, AuctionSort},
        bid::{Bid, BidStatus},
        deposit::{Deposit, DepositStatus},
        sealed_bid::SealedBid,
    },
    std::{
        collections::BTreeMap,
        sync::{Arc, Mutex},
    },
};

#[derive(Clone, Default)]
pub struct InMemory {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    auctions: BTreeMap<AuctionId, Auction>,
    bids: BTreeMap<BidId, Bid>,
    deposits: BTreeMap<(AuctionId, UserId), Deposit>,
    sealed_bids: BTreeMap<(AuctionId, UserId), SealedBid>,
    next_auction_id: AuctionId,
    next_bid_id: BidId,
}

impl Inner {
    fn competing(&self, auction: AuctionId) -> Vec<Bid> {
        let mut bids: Vec<_> = self
            .bids
            .values()
            .filter(|bid| bid.auction_id == auction && bid.is_competing())
            .cloned()
            .collect();
        sort_best_first(&mut bids);
        bids
    }

    fn recount(&mut self, auction: AuctionId) {
        let bidders: std::collections::BTreeSet<_> = self
            .bids
            .values()
            .filter(|bid| bid.auction_id == auction)
            .map(|bid| bid.bidder_id)
            .collect();
        let total = self
            .bids
            .values()
            .filter(|bid| bid.auction_id == auction)
            .count();
        if let Some(auction) = self.auctions.get_mut(&auction) {
            auction.total_bids = i32::try_from(total).unwrap_or(i32::MAX);
            auction.unique_bidders = i32::try_from(bidders.len()).unwrap_or(i32::MAX);
        }
    }

    fn demote_competing(&mut self, auction: AuctionId) {
        for bid in self.bids.values_mut() {
            if bid.auction_id == auction && bid.is_competing() {
                bid.status = BidStatus::Outbid;
            }
        }
    }
}

fn sort_best_first(bids: &mut [Bid]) {
    bids.sort_by(|a, b| {
        b.amount
            .cmp(&a.amount)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

impl InMemory {
    /// Test hook: flips the ciphertext of a stored sealed bid so decryption
    /// fails on reveal.
    pub fn corrupt_sealed_bid(&self, auction: AuctionId, bidder: UserId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(bid) = inner.sealed_bids.get_mut(&(auction, bidder)) {
            for byte in &mut bid.encrypted_amount {
                *byte = !*byte;
            }
        }
    }
}

#[async_trait::async_trait]
impl AuctionStoring for InMemory {
    async fn create_auction(&self, auction: &Auction) -> Result<AuctionId> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_auction_id += 1;
        let id = inner.next_auction_id;
        inner.auctions.insert(
            id,
            Auction {
                id,
                ..auction.clone()
            },
        );
        Ok(id)
    }

    async fn single_auction(&self, id: AuctionId) -> Result<Option<Auction>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.auctions.get(&id).cloned())
    }

    async fn auctions(&self, filter: &AuctionFilter) -> Result<Vec<Auction>> {
        let inner = self.inner.lock().unwrap();
        let mut auctions: Vec<_> = inner
            .auctions
            .values()
            .filter(|auction| {
                filter.status.is_none_or(|status| auction.status == status)
                    && filter
                        .auction_type
                        .is_none_or(|kind| auction.auction_type == kind)
                    && filter.seller_id.is_none_or(|id| auction.seller_id == id)
                    && filter
                        .min_price
                        .as_ref()
                        .is_none_or(|min| auction.current_price >= *min)
                    && filter
                        .max_price
                        .as_ref()
                        .is_none_or(|max| auction.current_price <= *max)
            })
            .cloned()
            .collect();
        match filter.sort {
            AuctionSort::EndingSoon => auctions.sort_by_key(|auction| auction.end_time),
            AuctionSort::NewlyListed => auctions.sort_by_key(|auction| std::cmp::Reverse(auction.id)),
            AuctionSort::PriceAscending => {
                auctions.sort_by(|a, b| a.current_price.cmp(&b.current_price))
            }
            AuctionSort::PriceDescending => {
                auctions.sort_by(|a, b| b.current_price.cmp(&a.current_price))
            }
        }
        let auctions = auctions
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.unwrap_or(i64::MAX).max(0) as usize)
            .collect();
        Ok(auctions)
    }

    async fn user_auctions(&self, seller: UserId) -> Result<Vec<Auction>> {
        let inner = self.inner.lock().unwrap();
        let mut auctions: Vec<_> = inner
            .auctions
            .values()
            .filter(|auction| auction.seller_id == seller)
            .cloned()
            .collect();
        auctions.sort_by_key(|auction| auction.end_time);
        Ok(auctions)
    }

    async fn expired_auctions(&self, now: DateTime<Utc>) -> Result<Vec<Auction>> {
        let inner = self.inner.lock().unwrap();
        let mut auctions: Vec<_> = inner
            .auctions
            .values()
            .filter(|auction| {
                auction.status == model::auction::AuctionStatus::Active && auction.end_time < now
            })
            .cloned()
            .collect();
        auctions.sort_by_key(|auction| auction.end_time);
        Ok(auctions)
    }

    async fn auctions_due_to_start(&self, now: DateTime<Utc>) -> Result<Vec<Auction>> {
        let inner = self.inner.lock().unwrap();
        let mut auctions: Vec<_> = inner
            .auctions
            .values()
            .filter(|auction| {
                auction.status == model::auction::AuctionStatus::Scheduled
                    && auction.start_time <= now
            })
            .cloned()
            .collect();
        auctions.sort_by_key(|auction| auction.start_time);
        Ok(auctions)
    }

    async fn start_auction(
        &self,
        id: AuctionId,
        expected_version: i64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.auctions.get_mut(&id) {
            Some(auction)
                if auction.version == expected_version
                    && auction.status == model::auction::AuctionStatus::Scheduled =>
            {
                auction.status = model::auction::AuctionStatus::Active;
                auction.version += 1;
                Ok(())
            }
            _ => Err(StoreError::Contended),
        }
    }

    async fn record_bid(&self, admission: &BidAdmission) -> Result<Bid, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.auctions.get_mut(&admission.auction_id) {
            Some(auction) if auction.version == admission.expected_version => {
                auction.current_price = admission.new_current_price.clone();
                if let Some(end_time) = admission.new_end_time {
                    auction.end_time = end_time;
                }
                auction.times_extended = admission.times_extended;
                auction.version += 1;
            }
            _ => return Err(StoreError::Contended),
        }
        inner.demote_competing(admission.auction_id);
        inner.next_bid_id += 1;
        let bid = Bid {
            id: inner.next_bid_id,
            ..admission.bid.clone()
        };
        inner.bids.insert(bid.id, bid.clone());
        inner.recount(admission.auction_id);
        Ok(bid)
    }

    async fn finalize_auction(&self, outcome: &AuctionOutcome) -> Result<Option<Bid>, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.auctions.get(&outcome.auction_id) {
            Some(auction) if auction.version == outcome.expected_version => {}
            _ => return Err(StoreError::Contended),
        }
        let mut winning_bid_id = outcome.winning_bid_id;
        let mut inserted = None;
        if let Some(bid) = &outcome.insert_winning_bid {
            inner.demote_competing(outcome.auction_id);
            inner.next_bid_id += 1;
            let bid = Bid {
                id: inner.next_bid_id,
                status: BidStatus::Won,
                ..bid.clone()
            };
            winning_bid_id = Some(bid.id);
            inner.bids.insert(bid.id, bid.clone());
            inserted = Some(bid);
        }
        if let Some(id) = winning_bid_id {
            if let Some(bid) = inner.bids.get_mut(&id) {
                bid.status = BidStatus::Won;
            }
        }
        for bid in inner.bids.values_mut() {
            if bid.auction_id == outcome.auction_id
                && Some(bid.id) != winning_bid_id
                && matches!(
                    bid.status,
                    BidStatus::Active | BidStatus::Winning | BidStatus::Outbid
                )
            {
                bid.status = BidStatus::Lost;
            }
        }
        let Some(auction) = inner.auctions.get_mut(&outcome.auction_id) else {
            return Err(StoreError::Contended);
        };
        auction.status = outcome.status;
        auction.actual_end_time = Some(outcome.actual_end_time);
        auction.winner_id = outcome.winner_id;
        auction.winning_bid_id = winning_bid_id;
        if let Some(price) = &outcome.final_price {
            auction.current_price = price.clone();
        }
        auction.version += 1;
        inner.recount(outcome.auction_id);
        Ok(inserted)
    }
}

#[async_trait::async_trait]
impl BidRetrieving for InMemory {
    async fn auction_bids(&self, auction: AuctionId) -> Result<Vec<Bid>> {
        let inner = self.inner.lock().unwrap();
        let mut bids: Vec<_> = inner
            .bids
            .values()
            .filter(|bid| bid.auction_id == auction)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bids)
    }

    async fn competing_bids(&self, auction: AuctionId) -> Result<Vec<Bid>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.competing(auction))
    }

    async fn user_bids(&self, user: UserId) -> Result<Vec<Bid>> {
        let inner = self.inner.lock().unwrap();
        let mut bids: Vec<_> = inner
            .bids
            .values()
            .filter(|bid| bid.bidder_id == user)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bids)
    }
}

#[async_trait::async_trait]
impl DepositStoring for InMemory {
    async fn deposit(&self, auction: AuctionId, user: UserId) -> Result<Option<Deposit>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.deposits.get(&(auction, user)).cloned())
    }

    async fn auction_deposits(&self, auction: AuctionId) -> Result<Vec<Deposit>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .deposits
            .values()
            .filter(|deposit| deposit.auction_id == auction)
            .cloned()
            .collect())
    }

    async fn save_deposit(&self, deposit: &Deposit) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .deposits
            .insert((deposit.auction_id, deposit.user_id), deposit.clone());
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
        let mut inner = self.inner.lock().unwrap();
        let Some(deposit) = inner.deposits.get_mut(&(auction, user)) else {
            return Ok(0);
        };
        if !deposit.status.is_valid() {
            return Ok(0);
        }
        deposit.status = to;
        if reason.is_some() {
            deposit.reason = reason;
        }
        match to {
            DepositStatus::Refunded => deposit.refunded_at = Some(now),
            DepositStatus::Forfeited => deposit.forfeited_at = Some(now),
            _ => {}
        }
        Ok(1)
    }

    async fn refund_non_winners(
        &self,
        auction: AuctionId,
        winner: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut refunded = 0;
        for deposit in inner.deposits.values_mut() {
            if deposit.auction_id == auction
                && deposit.status.is_valid()
                && Some(deposit.user_id) != winner
            {
                deposit.status = DepositStatus::Refunded;
                deposit.refunded_at = Some(now);
                deposit.reason = Some("auction closed".to_string());
                refunded += 1;
            }
        }
        Ok(refunded)
    }
}

#[async_trait::async_trait]
impl SealedBidStoring for InMemory {
    async fn insert_sealed_bid(&self, bid: &SealedBid) -> Result<(), InsertionError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (bid.auction_id, bid.bidder_id);
        if inner.sealed_bids.contains_key(&key) {
            return Err(InsertionError::DuplicatedRecord);
        }
        inner.sealed_bids.insert(key, bid.clone());
        Ok(())
    }

    async fn sealed_bids(&self, auction: AuctionId) -> Result<Vec<SealedBid>> {
        let inner = self.inner.lock().unwrap();
        let mut bids: Vec<_> = inner
            .sealed_bids
            .values()
            .filter(|bid| bid.auction_id == auction)
            .cloned()
            .collect();
        bids.sort_by_key(|bid| bid.submitted_at);
        Ok(bids)
    }

    async fn has_sealed_bid(&self, auction: AuctionId, bidder: UserId) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sealed_bids.contains_key(&(auction, bidder)))
    }

    async fn store_reveal(
        &self,
        auction: AuctionId,
        bidder: UserId,
        amount: &BigDecimal,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(bid) = inner.sealed_bids.get_mut(&(auction, bidder)) {
            if !bid.is_revealed {
                bid.is_revealed = true;
                bid.revealed_amount = Some(amount.clone());
                bid.revealed_at = Some(now);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, chrono::Duration};

    fn auction() -> Auction {
        Auction {
            status: model::auction::AuctionStatus::Active,
            starting_price: BigDecimal::from(1000),
            current_price: BigDecimal::from(1000),
            min_bid_increment: BigDecimal::from(50),
            start_time: Utc::now() - Duration::hours(1),
            end_time: Utc::now() + Duration::hours(1),
            ..Default::default()
        }
    }

    fn bid(auction: AuctionId, bidder: UserId, amount: u32) -> Bid {
        Bid {
            id: 0,
            auction_id: auction,
            bidder_id: bidder,
            amount: BigDecimal::from(amount),
            previous_bid: None,
            is_auto_bid: false,
            max_auto_bid: None,
            status: BidStatus::Winning,
            created_at: Utc::now(),
        }
    }

    fn admission(auction: AuctionId, version: i64, bid: Bid) -> BidAdmission {
        BidAdmission {
            auction_id: auction,
            expected_version: version,
            new_current_price: bid.amount.clone(),
            bid,
            new_end_time: None,
            times_extended: 0,
        }
    }

    #[tokio::test]
    async fn version_guard_rejects_stale_writer() {
        let store = InMemory::default();
        let id = store.create_auction(&auction()).await.unwrap();

        store
            .record_bid(&admission(id, 0, bid(id, 10, 1000)))
            .await
            .unwrap();
        let err = store
            .record_bid(&admission(id, 0, bid(id, 11, 1050)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Contended));
    }

    #[tokio::test]
    async fn record_bid_demotes_previous_leader() {
        let store = InMemory::default();
        let id = store.create_auction(&auction()).await.unwrap();

        let first = store
            .record_bid(&admission(id, 0, bid(id, 10, 1000)))
            .await
            .unwrap();
        let second = store
            .record_bid(&admission(id, 1, bid(id, 11, 1050)))
            .await
            .unwrap();

        let competing = store.competing_bids(id).await.unwrap();
        assert_eq!(competing.len(), 1);
        assert_eq!(competing[0].id, second.id);

        let all = store.auction_bids(id).await.unwrap();
        let demoted = all.iter().find(|bid| bid.id == first.id).unwrap();
        assert_eq!(demoted.status, BidStatus::Outbid);

        let auction = store.single_auction(id).await.unwrap().unwrap();
        assert_eq!(auction.total_bids, 2);
        assert_eq!(auction.unique_bidders, 2);
        assert_eq!(auction.version, 2);
    }
}
