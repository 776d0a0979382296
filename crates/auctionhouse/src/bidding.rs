//! Bid admission for open (English) auctions.
//!
//! Admission validates a request against the live auction state, resolves
//! proxy bids to the lowest amount that takes the lead and applies all
//! effects through a single version guarded write. Losing the version race
//! re-runs the whole pipeline against fresh state; after a few attempts the
//! caller gets a retryable error instead.

use {
    crate::{
        clock::Now,
        database::{
            StoreError,
            auctions::{AuctionStoring, BidAdmission},
            bids::BidRetrieving,
            deposits::DepositStoring,
        },
        notifications::{Event, Notifier},
    },
    bigdecimal::BigDecimal,
    chrono::Duration,
    model::{
        auction::{Auction, AuctionStatus, AuctionType},
        bid::{Bid, BidStatus},
    },
    std::{collections::BTreeSet, sync::Arc},
};

/// Attempts before giving up on a contended auction.
const MAX_ADMISSION_ATTEMPTS: usize = 3;

#[derive(Clone, Debug)]
pub struct BidRequest {
    pub auction_id: model::AuctionId,
    pub bidder_id: model::UserId,
    pub amount: BigDecimal,
    /// Upper bound for proxy bidding. When set, the engine admits the lowest
    /// amount that takes the lead instead of the stated amount.
    pub max_auto_bid: Option<BigDecimal>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlaceBidError {
    #[error("auction not found")]
    AuctionNotFound,
    #[error("auction has not started yet")]
    NotStarted,
    #[error("auction has ended")]
    Ended,
    #[error("sellers cannot bid on their own auctions")]
    SelfBid,
    #[error("a paid deposit is required to bid on this auction")]
    DepositRequired,
    #[error("bid must be at least {0}")]
    BelowMinimum(BigDecimal),
    #[error("auto-bid ceiling is below the bid amount")]
    InvalidAutoBidCeiling,
    #[error("this auction does not accept open bids")]
    WrongAuctionType,
    #[error("auction is processing other bids, try again")]
    Contended,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct Bidding {
    auctions: Arc<dyn AuctionStoring>,
    bids: Arc<dyn BidRetrieving>,
    deposits: Arc<dyn DepositStoring>,
    clock: Arc<dyn Now>,
    notifier: Notifier,
}

impl Bidding {
    pub fn new(
        auctions: Arc<dyn AuctionStoring>,
        bids: Arc<dyn BidRetrieving>,
        deposits: Arc<dyn DepositStoring>,
        clock: Arc<dyn Now>,
        notifier: Notifier,
    ) -> Self {
        Self {
            auctions,
            bids,
            deposits,
            clock,
            notifier,
        }
    }

    pub async fn place_bid(&self, request: &BidRequest) -> Result<Bid, PlaceBidError> {
        for attempt in 0..MAX_ADMISSION_ATTEMPTS {
            match self.try_place_bid(request).await {
                Err(PlaceBidError::Contended) => {
                    Metrics::get().admission_conflicts.inc();
                    tracing::debug!(
                        auction = request.auction_id,
                        attempt,
                        "lost admission race, retrying"
                    );
                }
                result => return result,
            }
        }
        Err(PlaceBidError::Contended)
    }

    async fn try_place_bid(&self, request: &BidRequest) -> Result<Bid, PlaceBidError> {
        let now = self.clock.now();
        let auction = self
            .auctions
            .single_auction(request.auction_id)
            .await?
            .ok_or(PlaceBidError::AuctionNotFound)?;
        self.validate(&auction, request).await?;

        let competing = self.bids.competing_bids(auction.id).await?;
        let leader = competing.first();
        let rival = competing
            .iter()
            .find(|bid| bid.bidder_id != request.bidder_id);
        let amount = admitted_amount(&auction, request, rival);

        let extended_until = auction
            .extension_applies(now)
            .then(|| now + Duration::minutes(auction.extension_minutes.into()));
        let times_extended = if extended_until.is_some() {
            auction.times_extended + 1
        } else {
            auction.times_extended
        };

        let admission = BidAdmission {
            auction_id: auction.id,
            expected_version: auction.version,
            bid: Bid {
                id: 0,
                auction_id: auction.id,
                bidder_id: request.bidder_id,
                amount: amount.clone(),
                previous_bid: leader.map(|bid| bid.amount.clone()),
                is_auto_bid: request.max_auto_bid.is_some(),
                max_auto_bid: request.max_auto_bid.clone(),
                status: BidStatus::Winning,
                created_at: now,
            },
            new_current_price: amount.clone(),
            new_end_time: extended_until,
            times_extended,
        };
        let stored = match self.auctions.record_bid(&admission).await {
            Ok(bid) => bid,
            Err(StoreError::Contended) => return Err(PlaceBidError::Contended),
            Err(StoreError::Database(err)) => return Err(anyhow::Error::from(err).into()),
        };
        Metrics::get().bids_admitted.inc();
        if extended_until.is_some() {
            Metrics::get().anti_snipe_extensions.inc();
        }

        self.notifier.notify(
            auction.seller_id,
            Event::NewBid {
                auction_id: auction.id,
                bidder_id: stored.bidder_id,
                amount: stored.amount.clone(),
            },
        );
        let outbid: BTreeSet<_> = competing
            .iter()
            .map(|bid| bid.bidder_id)
            .filter(|bidder| *bidder != request.bidder_id)
            .collect();
        for bidder in outbid {
            self.notifier.notify(
                bidder,
                Event::Outbid {
                    auction_id: auction.id,
                    amount: stored.amount.clone(),
                },
            );
        }
        Ok(stored)
    }

    /// The ordered preconditions. The first violated one determines the
    /// error.
    async fn validate(&self, auction: &Auction, request: &BidRequest) -> Result<(), PlaceBidError> {
        let now = self.clock.now();
        if auction.auction_type != AuctionType::English {
            return Err(PlaceBidError::WrongAuctionType);
        }
        match auction.status {
            AuctionStatus::Active => {}
            AuctionStatus::Scheduled => return Err(PlaceBidError::NotStarted),
            _ => return Err(PlaceBidError::Ended),
        }
        if !auction.has_started(now) {
            return Err(PlaceBidError::NotStarted);
        }
        if auction.has_expired(now) {
            return Err(PlaceBidError::Ended);
        }
        if request.bidder_id == auction.seller_id {
            return Err(PlaceBidError::SelfBid);
        }
        if auction.requires_deposit {
            let valid = self
                .deposits
                .deposit(auction.id, request.bidder_id)
                .await?
                .is_some_and(|deposit| deposit.status.is_valid());
            if !valid {
                return Err(PlaceBidError::DepositRequired);
            }
        }
        let minimum = auction.minimum_bid();
        if request.amount < minimum {
            return Err(PlaceBidError::BelowMinimum(minimum));
        }
        if let Some(ceiling) = &request.max_auto_bid {
            if *ceiling < request.amount {
                return Err(PlaceBidError::InvalidAutoBidCeiling);
            }
        }
        Ok(())
    }
}

/// Resolves the amount the bid is admitted at. Plain bids stand at their
/// stated amount. Proxy bids stand at the lowest amount that tops the best
/// competing bid of another bidder, capped at the ceiling.
fn admitted_amount(auction: &Auction, request: &BidRequest, rival: Option<&Bid>) -> BigDecimal {
    let (Some(ceiling), Some(rival)) = (&request.max_auto_bid, rival) else {
        return request.amount.clone();
    };
    let stepped = &rival.amount + &auction.min_bid_increment;
    let amount = stepped.min(ceiling.clone());
    if amount < rival.amount {
        // The ceiling cannot top the rival. Validation rules this out, but
        // standing at the full ceiling keeps the price monotonic if it ever
        // happens.
        ceiling.clone()
    } else {
        amount
    }
}

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "bidding")]
struct Metrics {
    /// Number of bids admitted.
    bids_admitted: prometheus::IntCounter,

    /// Number of admissions that lost the version race.
    admission_conflicts: prometheus::IntCounter,

    /// Number of anti-snipe extensions granted.
    anti_snipe_extensions: prometheus::IntCounter,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            clock::testing::FakeClock,
            database::{
                auctions::MockAuctionStoring,
                bids::MockBidRetrieving,
                deposits::MockDepositStoring,
                memory::InMemory,
            },
            notifications::LogSink,
        },
        chrono::{DateTime, Utc},
        model::deposit::{Deposit, DepositStatus},
    };

    fn start() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn auction() -> Auction {
        Auction {
            seller_id: 1,
            status: AuctionStatus::Active,
            starting_price: BigDecimal::from(1000),
            current_price: BigDecimal::from(1000),
            min_bid_increment: BigDecimal::from(50),
            start_time: start(),
            end_time: start() + Duration::hours(24),
            ..Default::default()
        }
    }

    fn request(auction: model::AuctionId, bidder: model::UserId, amount: u32) -> BidRequest {
        BidRequest {
            auction_id: auction,
            bidder_id: bidder,
            amount: BigDecimal::from(amount),
            max_auto_bid: None,
        }
    }

    struct Setup {
        bidding: Bidding,
        store: InMemory,
        clock: Arc<FakeClock>,
    }

    async fn setup(auction: Auction) -> (Setup, model::AuctionId) {
        let store = InMemory::default();
        let clock = Arc::new(FakeClock::new(start() + Duration::hours(1)));
        let id = store.create_auction(&auction).await.unwrap();
        let bidding = Bidding::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            clock.clone(),
            Notifier::spawn(Arc::new(LogSink)),
        );
        (
            Setup {
                bidding,
                store,
                clock,
            },
            id,
        )
    }

    #[tokio::test]
    async fn opening_bid_stands_at_starting_price() {
        let (setup, id) = setup(auction()).await;
        let bid = setup.bidding.place_bid(&request(id, 2, 1000)).await.unwrap();
        assert_eq!(bid.amount, BigDecimal::from(1000));
        assert_eq!(bid.status, BidStatus::Winning);
        assert_eq!(bid.previous_bid, None);
    }

    #[tokio::test]
    async fn opening_bid_below_starting_price_is_rejected() {
        let (setup, id) = setup(auction()).await;
        let err = setup
            .bidding
            .place_bid(&request(id, 2, 999))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::BelowMinimum(min) if min == BigDecimal::from(1000)));
    }

    #[tokio::test]
    async fn later_bids_must_top_current_price_by_increment() {
        let (setup, id) = setup(auction()).await;
        setup.bidding.place_bid(&request(id, 2, 1000)).await.unwrap();
        let err = setup
            .bidding
            .place_bid(&request(id, 3, 1049))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::BelowMinimum(min) if min == BigDecimal::from(1050)));
    }

    #[tokio::test]
    async fn admission_keeps_a_single_leader() {
        let (setup, id) = setup(auction()).await;
        setup.bidding.place_bid(&request(id, 2, 1000)).await.unwrap();
        setup.bidding.place_bid(&request(id, 3, 1050)).await.unwrap();
        setup.bidding.place_bid(&request(id, 4, 1100)).await.unwrap();

        let competing = setup.store.competing_bids(id).await.unwrap();
        assert_eq!(competing.len(), 1);
        assert_eq!(competing[0].bidder_id, 4);

        let auction = setup.store.single_auction(id).await.unwrap().unwrap();
        assert_eq!(auction.current_price, BigDecimal::from(1100));
        assert_eq!(auction.total_bids, 3);
        assert_eq!(auction.unique_bidders, 3);
    }

    #[tokio::test]
    async fn bidders_may_raise_their_own_lead() {
        let (setup, id) = setup(auction()).await;
        let first = setup.bidding.place_bid(&request(id, 2, 1000)).await.unwrap();
        setup.bidding.place_bid(&request(id, 2, 1100)).await.unwrap();

        let competing = setup.store.competing_bids(id).await.unwrap();
        assert_eq!(competing.len(), 1);
        assert_eq!(competing[0].amount, BigDecimal::from(1100));

        let all = setup.store.auction_bids(id).await.unwrap();
        let prior = all.iter().find(|bid| bid.id == first.id).unwrap();
        assert_eq!(prior.status, BidStatus::Outbid);
    }

    #[tokio::test]
    async fn seller_cannot_bid() {
        let (setup, id) = setup(auction()).await;
        let err = setup
            .bidding
            .place_bid(&request(id, 1, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::SelfBid));
    }

    #[tokio::test]
    async fn scheduled_auction_rejects_bids() {
        let (setup, id) = setup(Auction {
            status: AuctionStatus::Scheduled,
            ..auction()
        })
        .await;
        let err = setup
            .bidding
            .place_bid(&request(id, 2, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::NotStarted));
    }

    #[tokio::test]
    async fn expired_auction_rejects_bids() {
        let (setup, id) = setup(auction()).await;
        setup.clock.set(start() + Duration::hours(25));
        let err = setup
            .bidding
            .place_bid(&request(id, 2, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::Ended));
    }

    #[tokio::test]
    async fn sealed_auctions_reject_open_bids() {
        let (setup, id) = setup(Auction {
            auction_type: AuctionType::SealedBid,
            ..auction()
        })
        .await;
        let err = setup
            .bidding
            .place_bid(&request(id, 2, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::WrongAuctionType));
    }

    #[tokio::test]
    async fn deposit_gate() {
        let (setup, id) = setup(Auction {
            requires_deposit: true,
            ..auction()
        })
        .await;
        let err = setup
            .bidding
            .place_bid(&request(id, 2, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::DepositRequired));

        setup
            .store
            .save_deposit(&Deposit {
                auction_id: id,
                user_id: 2,
                amount: BigDecimal::from(100),
                status: DepositStatus::Paid,
                method: "card".to_string(),
                reference: "ref".to_string(),
                paid_at: start(),
                refunded_at: None,
                forfeited_at: None,
                reason: None,
            })
            .await
            .unwrap();
        setup.bidding.place_bid(&request(id, 2, 1000)).await.unwrap();
    }

    #[tokio::test]
    async fn refunded_deposit_does_not_satisfy_the_gate() {
        let (setup, id) = setup(Auction {
            requires_deposit: true,
            ..auction()
        })
        .await;
        setup
            .store
            .save_deposit(&Deposit {
                auction_id: id,
                user_id: 2,
                amount: BigDecimal::from(100),
                status: DepositStatus::Refunded,
                method: "card".to_string(),
                reference: "ref".to_string(),
                paid_at: start(),
                refunded_at: Some(start()),
                forfeited_at: None,
                reason: None,
            })
            .await
            .unwrap();
        let err = setup
            .bidding
            .place_bid(&request(id, 2, 1000))
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::DepositRequired));
    }

    #[tokio::test]
    async fn proxy_bid_stands_at_lowest_winning_amount() {
        let (setup, id) = setup(auction()).await;
        setup.bidding.place_bid(&request(id, 2, 1000)).await.unwrap();
        let bid = setup
            .bidding
            .place_bid(&BidRequest {
                max_auto_bid: Some(BigDecimal::from(1500)),
                ..request(id, 3, 1200)
            })
            .await
            .unwrap();
        // Only 1050 is needed to top the rival at 1000.
        assert_eq!(bid.amount, BigDecimal::from(1050));
        assert!(bid.is_auto_bid);
        assert_eq!(bid.max_auto_bid, Some(BigDecimal::from(1500)));

        let auction = setup.store.single_auction(id).await.unwrap().unwrap();
        assert_eq!(auction.current_price, BigDecimal::from(1050));
    }

    #[tokio::test]
    async fn outbid_proxies_are_not_rebid() {
        let (setup, id) = setup(auction()).await;
        setup.bidding.place_bid(&request(id, 2, 1000)).await.unwrap();
        let proxy = setup
            .bidding
            .place_bid(&BidRequest {
                max_auto_bid: Some(BigDecimal::from(1500)),
                ..request(id, 3, 1200)
            })
            .await
            .unwrap();
        assert_eq!(proxy.amount, BigDecimal::from(1050));

        // A manual bid tops the proxy; the proxy's unused headroom up to
        // 1500 is never spent on its behalf.
        setup.bidding.place_bid(&request(id, 4, 1200)).await.unwrap();

        let competing = setup.store.competing_bids(id).await.unwrap();
        assert_eq!(competing.len(), 1);
        assert_eq!(competing[0].bidder_id, 4);

        let all = setup.store.auction_bids(id).await.unwrap();
        assert_eq!(all.len(), 3);
        let outbid = all.iter().find(|bid| bid.id == proxy.id).unwrap();
        assert_eq!(outbid.status, BidStatus::Outbid);

        let auction = setup.store.single_auction(id).await.unwrap().unwrap();
        assert_eq!(auction.current_price, BigDecimal::from(1200));
    }

    #[tokio::test]
    async fn proxy_bid_without_rivals_stands_at_stated_amount() {
        let (setup, id) = setup(auction()).await;
        let bid = setup
            .bidding
            .place_bid(&BidRequest {
                max_auto_bid: Some(BigDecimal::from(1500)),
                ..request(id, 2, 1000)
            })
            .await
            .unwrap();
        assert_eq!(bid.amount, BigDecimal::from(1000));
    }

    #[tokio::test]
    async fn ceiling_below_bid_amount_is_rejected() {
        let (setup, id) = setup(auction()).await;
        let err = setup
            .bidding
            .place_bid(&BidRequest {
                max_auto_bid: Some(BigDecimal::from(900)),
                ..request(id, 2, 1000)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PlaceBidError::InvalidAutoBidCeiling));
    }

    #[tokio::test]
    async fn anti_snipe_extends_from_admission_time() {
        let (setup, id) = setup(Auction {
            auto_extend: true,
            extension_minutes: 10,
            extension_threshold_minutes: 5,
            max_extensions: 3,
            ..auction()
        })
        .await;
        // Two minutes before the end.
        let now = start() + Duration::hours(24) - Duration::minutes(2);
        setup.clock.set(now);
        setup.bidding.place_bid(&request(id, 2, 1000)).await.unwrap();

        let auction = setup.store.single_auction(id).await.unwrap().unwrap();
        assert_eq!(auction.end_time, now + Duration::minutes(10));
        assert_eq!(auction.times_extended, 1);
    }

    #[tokio::test]
    async fn extension_budget_is_finite() {
        let (setup, id) = setup(Auction {
            auto_extend: true,
            extension_minutes: 10,
            extension_threshold_minutes: 5,
            max_extensions: 1,
            ..auction()
        })
        .await;
        let now = start() + Duration::hours(24) - Duration::minutes(2);
        setup.clock.set(now);
        setup.bidding.place_bid(&request(id, 2, 1000)).await.unwrap();
        let extended = setup.store.single_auction(id).await.unwrap().unwrap();
        assert_eq!(extended.times_extended, 1);

        // Again inside the window of the pushed out end time.
        setup.clock.set(now + Duration::minutes(8));
        setup.bidding.place_bid(&request(id, 3, 1050)).await.unwrap();
        let auction = setup.store.single_auction(id).await.unwrap().unwrap();
        assert_eq!(auction.times_extended, 1);
        assert_eq!(auction.end_time, extended.end_time);
    }

    #[tokio::test]
    async fn bids_outside_the_window_do_not_extend() {
        let (setup, id) = setup(Auction {
            auto_extend: true,
            extension_minutes: 10,
            extension_threshold_minutes: 5,
            max_extensions: 3,
            ..auction()
        })
        .await;
        setup.bidding.place_bid(&request(id, 2, 1000)).await.unwrap();
        let auction = setup.store.single_auction(id).await.unwrap().unwrap();
        assert_eq!(auction.times_extended, 0);
        assert_eq!(auction.end_time, start() + Duration::hours(24));
    }

    #[tokio::test]
    async fn contended_admission_retries_against_fresh_state() {
        let mut auctions = MockAuctionStoring::new();
        let mut stored = auction();
        stored.id = 1;
        let state = stored.clone();
        auctions
            .expect_single_auction()
            .times(3)
            .returning(move |_| Ok(Some(state.clone())));
        let mut failures = 2;
        auctions.expect_record_bid().times(3).returning(move |a| {
            if failures > 0 {
                failures -= 1;
                return Err(StoreError::Contended);
            }
            Ok(Bid { id: 7, ..a.bid.clone() })
        });
        let mut bids = MockBidRetrieving::new();
        bids.expect_competing_bids().returning(|_| Ok(vec![]));

        let bidding = Bidding::new(
            Arc::new(auctions),
            Arc::new(bids),
            Arc::new(MockDepositStoring::new()),
            Arc::new(FakeClock::new(start() + Duration::hours(1))),
            Notifier::spawn(Arc::new(LogSink)),
        );
        let bid = bidding.place_bid(&request(1, 2, 1000)).await.unwrap();
        assert_eq!(bid.id, 7);
    }

    #[tokio::test]
    async fn persistently_contended_admission_gives_up() {
        let mut auctions = MockAuctionStoring::new();
        let mut stored = auction();
        stored.id = 1;
        let state = stored.clone();
        auctions
            .expect_single_auction()
            .times(3)
            .returning(move |_| Ok(Some(state.clone())));
        auctions
            .expect_record_bid()
            .times(3)
            .returning(|_| Err(StoreError::Contended));
        let mut bids = MockBidRetrieving::new();
        bids.expect_competing_bids().returning(|_| Ok(vec![]));

        let bidding = Bidding::new(
            Arc::new(auctions),
            Arc::new(bids),
            Arc::new(MockDepositStoring::new()),
            Arc::new(FakeClock::new(start() + Duration::hours(1))),
            Notifier::spawn(Arc::new(LogSink)),
        );
        let err = bidding.place_bid(&request(1, 2, 1000)).await.unwrap_err();
        assert!(matches!(err, PlaceBidError::Contended));
    }
}
