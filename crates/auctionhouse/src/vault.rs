//! Sealed-bid vault.
//!
//! Amounts are encrypted at submission time and stay opaque, even to
//! operators with database access, until the auction is over. Reveal
//! decrypts every stored bid once the end time has passed; winner
//! determination ranks the revealed amounts and applies the same terminal
//! transition as the open auction close.

use {
    crate::{
        clock::Now,
        database::{
            InsertionError,
            StoreError,
            auctions::{AuctionOutcome, AuctionStoring},
            deposits::DepositStoring,
            sealed_bids::SealedBidStoring,
        },
        notifications::{Event, Notifier},
    },
    aes_gcm::{
        Aes256Gcm,
        Nonce,
        aead::{Aead, KeyInit},
    },
    anyhow::{Context, Result, anyhow},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    model::{
        AuctionId,
        UserId,
        auction::{Auction, AuctionStatus, AuctionType},
        sealed_bid::SealedBid,
    },
    sha2::{Digest, Sha256},
    std::sync::Arc,
};

const MAX_FINALIZE_ATTEMPTS: usize = 3;

/// AES-256-GCM wrapper around the sealed bid key. A fresh random nonce is
/// drawn per bid and stored alongside the ciphertext.
pub struct SealedBidCipher {
    cipher: Aes256Gcm,
}

impl SealedBidCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    pub fn from_hex(key: &str) -> Result<Self> {
        let bytes = hex::decode(key).context("sealed bid key is not valid hex")?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow!("sealed bid key must be exactly 32 bytes"))?;
        Ok(Self::new(&key))
    }

    fn seal(&self, amount: &BigDecimal) -> Result<(Vec<u8>, Vec<u8>)> {
        let nonce: [u8; 12] = rand::random();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), amount.to_string().as_bytes())
            .map_err(|_| anyhow!("failed to encrypt sealed bid"))?;
        Ok((ciphertext, nonce.to_vec()))
    }

    fn open(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<BigDecimal> {
        anyhow::ensure!(nonce.len() == 12, "stored nonce has the wrong length");
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("failed to decrypt sealed bid"))?;
        let amount = std::str::from_utf8(&plaintext)
            .context("sealed bid plaintext is not utf-8")?
            .parse()
            .context("sealed bid plaintext is not a number")?;
        Ok(amount)
    }
}

#[derive(Clone, Debug)]
pub struct SealedBidRequest {
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub amount: BigDecimal,
    pub notes: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitSealedBidError {
    #[error("auction not found")]
    AuctionNotFound,
    #[error("this auction does not accept sealed bids")]
    WrongAuctionType,
    #[error("auction has not started yet")]
    NotStarted,
    #[error("auction has ended")]
    Ended,
    #[error("sellers cannot bid on their own auctions")]
    SelfBid,
    #[error("bid must be at least {0}")]
    BelowStartingPrice(BigDecimal),
    #[error("a sealed bid was already submitted for this auction")]
    AlreadySubmitted,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RevealError {
    #[error("auction not found")]
    AuctionNotFound,
    #[error("this auction has no sealed bids")]
    WrongAuctionType,
    #[error("auction is still running")]
    StillRunning,
    #[error("auction is processing other updates, try again")]
    Contended,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub struct Vault {
    auctions: Arc<dyn AuctionStoring>,
    sealed_bids: Arc<dyn SealedBidStoring>,
    deposits: Arc<dyn DepositStoring>,
    cipher: SealedBidCipher,
    clock: Arc<dyn Now>,
    notifier: Notifier,
}

impl Vault {
    pub fn new(
        auctions: Arc<dyn AuctionStoring>,
        sealed_bids: Arc<dyn SealedBidStoring>,
        deposits: Arc<dyn DepositStoring>,
        cipher: SealedBidCipher,
        clock: Arc<dyn Now>,
        notifier: Notifier,
    ) -> Self {
        Self {
            auctions,
            sealed_bids,
            deposits,
            cipher,
            clock,
            notifier,
        }
    }

    /// Encrypts and stores a sealed bid. One shot per bidder per auction;
    /// there is no amending or withdrawing.
    pub async fn submit(&self, request: &SealedBidRequest) -> Result<SealedBid, SubmitSealedBidError> {
        let now = self.clock.now();
        let auction = self
            .auctions
            .single_auction(request.auction_id)
            .await?
            .ok_or(SubmitSealedBidError::AuctionNotFound)?;
        if auction.auction_type != AuctionType::SealedBid {
            return Err(SubmitSealedBidError::WrongAuctionType);
        }
        match auction.status {
            AuctionStatus::Active => {}
            AuctionStatus::Scheduled => return Err(SubmitSealedBidError::NotStarted),
            _ => return Err(SubmitSealedBidError::Ended),
        }
        if !auction.has_started(now) {
            return Err(SubmitSealedBidError::NotStarted);
        }
        if auction.has_expired(now) {
            return Err(SubmitSealedBidError::Ended);
        }
        if request.bidder_id == auction.seller_id {
            return Err(SubmitSealedBidError::SelfBid);
        }
        if request.amount < auction.starting_price {
            return Err(SubmitSealedBidError::BelowStartingPrice(
                auction.starting_price.clone(),
            ));
        }
        let (encrypted_amount, nonce) = self.cipher.seal(&request.amount)?;
        let bid = SealedBid {
            auction_id: request.auction_id,
            bidder_id: request.bidder_id,
            encrypted_amount,
            nonce,
            bid_hash: commitment(request.auction_id, request.bidder_id, &request.amount, now),
            is_revealed: false,
            revealed_amount: None,
            notes: request.notes.clone(),
            submitted_at: now,
            revealed_at: None,
        };
        match self.sealed_bids.insert_sealed_bid(&bid).await {
            Ok(()) => {}
            Err(InsertionError::DuplicatedRecord) => {
                return Err(SubmitSealedBidError::AlreadySubmitted);
            }
            Err(InsertionError::DbError(err)) => {
                return Err(anyhow::Error::from(err).into());
            }
        }
        Metrics::get().sealed_bids_submitted.inc();
        Ok(bid)
    }

    pub async fn has_submitted(&self, auction: AuctionId, bidder: UserId) -> Result<bool> {
        self.sealed_bids.has_sealed_bid(auction, bidder).await
    }

    /// Decrypts every sealed bid of an auction that is past its end time and
    /// persists the plaintext amounts. Undecryptable bids are logged and
    /// excluded from the returned set, not fatal. Returns the revealed bids,
    /// best amount first.
    pub async fn reveal(&self, auction_id: AuctionId) -> Result<Vec<SealedBid>, RevealError> {
        let auction = self
            .auctions
            .single_auction(auction_id)
            .await?
            .ok_or(RevealError::AuctionNotFound)?;
        if auction.auction_type != AuctionType::SealedBid {
            return Err(RevealError::WrongAuctionType);
        }
        let now = self.clock.now();
        if !auction.has_expired(now) && !auction.status.is_terminal() {
            return Err(RevealError::StillRunning);
        }
        let mut bids = self.sealed_bids.sealed_bids(auction_id).await?;
        for bid in &mut bids {
            if bid.is_revealed {
                continue;
            }
            match self.cipher.open(&bid.encrypted_amount, &bid.nonce) {
                Ok(amount) => {
                    self.sealed_bids
                        .store_reveal(auction_id, bid.bidder_id, &amount, now)
                        .await?;
                    bid.is_revealed = true;
                    bid.revealed_amount = Some(amount);
                    bid.revealed_at = Some(now);
                    Metrics::get().sealed_bids_revealed.inc();
                }
                Err(err) => {
                    tracing::warn!(
                        ?err,
                        auction = auction_id,
                        bidder = bid.bidder_id,
                        "skipping undecryptable sealed bid"
                    );
                }
            }
        }
        bids.retain(|bid| bid.revealed_amount.is_some());
        sort_best_first(&mut bids);
        Ok(bids)
    }

    /// Reveals and settles a sealed-bid auction: the highest revealed amount
    /// meeting the reserve wins, ties go to the earlier submission.
    /// Idempotent on terminal auctions.
    pub async fn determine_winner(&self, auction_id: AuctionId) -> Result<Auction, RevealError> {
        for _ in 0..MAX_FINALIZE_ATTEMPTS {
            let auction = self
                .auctions
                .single_auction(auction_id)
                .await?
                .ok_or(RevealError::AuctionNotFound)?;
            if auction.auction_type != AuctionType::SealedBid {
                return Err(RevealError::WrongAuctionType);
            }
            if auction.status.is_terminal() {
                return Ok(auction);
            }
            let now = self.clock.now();
            if !auction.has_expired(now) {
                return Err(RevealError::StillRunning);
            }
            let revealed = self.reveal(auction_id).await?;
            let best = revealed.first();
            let winner = best.filter(|bid| {
                let amount = bid.revealed_amount.as_ref();
                auction
                    .reserve_price
                    .as_ref()
                    .is_none_or(|reserve| amount.is_some_and(|amount| amount >= reserve))
            });
            let outcome = AuctionOutcome {
                auction_id,
                expected_version: auction.version,
                status: if winner.is_some() {
                    AuctionStatus::Completed
                } else {
                    AuctionStatus::Ended
                },
                actual_end_time: now,
                winner_id: winner.map(|bid| bid.bidder_id),
                winning_bid_id: None,
                insert_winning_bid: None,
                final_price: winner.and_then(|bid| bid.revealed_amount.clone()),
            };
            match self.auctions.finalize_auction(&outcome).await {
                Ok(_) => {}
                Err(StoreError::Contended) => continue,
                Err(StoreError::Database(err)) => return Err(anyhow::Error::from(err).into()),
            }
            self.settle(&auction, &revealed, winner, now).await;
            return self
                .auctions
                .single_auction(auction_id)
                .await?
                .ok_or(RevealError::AuctionNotFound);
        }
        Err(RevealError::Contended)
    }

    /// Settles every expired sealed-bid auction. Invoked by the maintenance
    /// sweep.
    pub async fn settle_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let expired = self.auctions.expired_auctions(now).await?;
        let mut settled = 0;
        for auction in expired
            .iter()
            .filter(|auction| auction.auction_type == AuctionType::SealedBid)
        {
            match self.determine_winner(auction.id).await {
                Ok(_) => settled += 1,
                Err(err) => {
                    tracing::error!(?err, auction = auction.id, "failed to settle sealed auction")
                }
            }
        }
        Ok(settled)
    }

    async fn settle(
        &self,
        auction: &Auction,
        revealed: &[SealedBid],
        winner: Option<&SealedBid>,
        now: DateTime<Utc>,
    ) {
        let winner_id = winner.map(|bid| bid.bidder_id);
        // A missing winner refunds every deposit.
        if let Err(err) = self
            .deposits
            .refund_non_winners(auction.id, winner_id, now)
            .await
        {
            tracing::error!(?err, auction = auction.id, "failed to refund losing deposits");
        }
        self.notifier.notify(
            auction.seller_id,
            Event::AuctionEnded {
                auction_id: auction.id,
                status: if winner_id.is_some() {
                    AuctionStatus::Completed
                } else {
                    AuctionStatus::Ended
                },
            },
        );
        if let Some(bid) = winner {
            if let Some(amount) = &bid.revealed_amount {
                self.notifier.notify(
                    bid.bidder_id,
                    Event::AuctionWon {
                        auction_id: auction.id,
                        amount: amount.clone(),
                    },
                );
            }
        }
        for bid in revealed {
            if Some(bid.bidder_id) != winner_id {
                self.notifier.notify(
                    bid.bidder_id,
                    Event::AuctionLost {
                        auction_id: auction.id,
                    },
                );
            }
        }
    }
}

/// Ranks the highest revealed amount first, ties to the earlier submission.
fn sort_best_first(bids: &mut [SealedBid]) {
    bids.sort_by(|a, b| {
        b.revealed_amount
            .cmp(&a.revealed_amount)
            .then(a.submitted_at.cmp(&b.submitted_at))
            .then(a.bidder_id.cmp(&b.bidder_id))
    });
}

/// Tamper-evident commitment covering the bid's identity, amount and
/// submission time.
fn commitment(
    auction: AuctionId,
    bidder: UserId,
    amount: &BigDecimal,
    at: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{auction}:{bidder}:{amount}:{}", at.to_rfc3339()));
    hex::encode(hasher.finalize())
}

#[derive(prometheus_metric_storage::MetricStorage, Clone, Debug)]
#[metric(subsystem = "vault")]
struct Metrics {
    /// Number of sealed bids accepted.
    sealed_bids_submitted: prometheus::IntCounter,

    /// Number of sealed bids decrypted after close.
    sealed_bids_revealed: prometheus::IntCounter,
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
        crate::{clock::testing::FakeClock, database::memory::InMemory, notifications::LogSink},
        chrono::Duration,
        model::deposit::{Deposit, DepositStatus},
    };

    fn start() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn auction() -> Auction {
        Auction {
            seller_id: 1,
            auction_type: AuctionType::SealedBid,
            status: AuctionStatus::Active,
            starting_price: BigDecimal::from(100),
            current_price: BigDecimal::from(100),
            min_bid_increment: BigDecimal::from(10),
            start_time: start(),
            end_time: start() + Duration::hours(24),
            ..Default::default()
        }
    }

    fn request(auction: AuctionId, bidder: UserId, amount: u32) -> SealedBidRequest {
        SealedBidRequest {
            auction_id: auction,
            bidder_id: bidder,
            amount: BigDecimal::from(amount),
            notes: None,
        }
    }

    struct Setup {
        vault: Vault,
        store: InMemory,
        clock: Arc<FakeClock>,
    }

    fn setup() -> Setup {
        let store = InMemory::default();
        let clock = Arc::new(FakeClock::new(start() + Duration::hours(1)));
        let vault = Vault::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            SealedBidCipher::new(&[7; 32]),
            clock.clone(),
            Notifier::spawn(Arc::new(LogSink)),
        );
        Setup {
            vault,
            store,
            clock,
        }
    }

    #[tokio::test]
    async fn amounts_are_opaque_at_rest() {
        let setup = setup();
        let id = setup.store.create_auction(&auction()).await.unwrap();
        setup.vault.submit(&request(id, 2, 500)).await.unwrap();

        let stored = &setup.store.sealed_bids(id).await.unwrap()[0];
        assert!(!stored.encrypted_amount.is_empty());
        assert!(!stored.encrypted_amount.windows(3).any(|w| w == b"500"));
        assert_eq!(stored.revealed_amount, None);
        assert!(!stored.is_revealed);
        assert_eq!(stored.bid_hash.len(), 64);
    }

    #[tokio::test]
    async fn one_sealed_bid_per_bidder() {
        let setup = setup();
        let id = setup.store.create_auction(&auction()).await.unwrap();
        setup.vault.submit(&request(id, 2, 500)).await.unwrap();
        let err = setup.vault.submit(&request(id, 2, 600)).await.unwrap_err();
        assert!(matches!(err, SubmitSealedBidError::AlreadySubmitted));
    }

    #[tokio::test]
    async fn submission_preconditions() {
        let setup = setup();
        let id = setup.store.create_auction(&auction()).await.unwrap();

        let err = setup.vault.submit(&request(id, 1, 500)).await.unwrap_err();
        assert!(matches!(err, SubmitSealedBidError::SelfBid));

        let err = setup.vault.submit(&request(id, 2, 99)).await.unwrap_err();
        assert!(
            matches!(err, SubmitSealedBidError::BelowStartingPrice(min) if min == BigDecimal::from(100))
        );

        let open = setup
            .store
            .create_auction(&Auction {
                auction_type: AuctionType::English,
                ..auction()
            })
            .await
            .unwrap();
        let err = setup.vault.submit(&request(open, 2, 500)).await.unwrap_err();
        assert!(matches!(err, SubmitSealedBidError::WrongAuctionType));

        setup.clock.set(start() + Duration::hours(25));
        let err = setup.vault.submit(&request(id, 2, 500)).await.unwrap_err();
        assert!(matches!(err, SubmitSealedBidError::Ended));
    }

    #[tokio::test]
    async fn reveal_waits_for_the_end_time() {
        let setup = setup();
        let id = setup.store.create_auction(&auction()).await.unwrap();
        setup.vault.submit(&request(id, 2, 500)).await.unwrap();

        let err = setup.vault.reveal(id).await.unwrap_err();
        assert!(matches!(err, RevealError::StillRunning));

        setup.clock.set(start() + Duration::hours(25));
        let revealed = setup.vault.reveal(id).await.unwrap();
        assert_eq!(revealed[0].revealed_amount, Some(BigDecimal::from(500)));
        assert!(revealed[0].is_revealed);
    }

    #[tokio::test]
    async fn highest_revealed_amount_wins() {
        let setup = setup();
        let id = setup.store.create_auction(&auction()).await.unwrap();
        setup.vault.submit(&request(id, 2, 300)).await.unwrap();
        setup.vault.submit(&request(id, 3, 500)).await.unwrap();
        setup.vault.submit(&request(id, 4, 400)).await.unwrap();
        setup.clock.set(start() + Duration::hours(25));

        let settled = setup.vault.determine_winner(id).await.unwrap();
        assert_eq!(settled.status, AuctionStatus::Completed);
        assert_eq!(settled.winner_id, Some(3));
        assert_eq!(settled.current_price, BigDecimal::from(500));
        assert!(settled.actual_end_time.is_some());

        // Idempotent once terminal.
        let again = setup.vault.determine_winner(id).await.unwrap();
        assert_eq!(again.version, settled.version);
    }

    #[tokio::test]
    async fn ties_go_to_the_earlier_submission() {
        let setup = setup();
        let id = setup.store.create_auction(&auction()).await.unwrap();
        setup.vault.submit(&request(id, 2, 500)).await.unwrap();
        setup.clock.advance(Duration::minutes(5));
        setup.vault.submit(&request(id, 3, 500)).await.unwrap();
        setup.clock.set(start() + Duration::hours(25));

        let settled = setup.vault.determine_winner(id).await.unwrap();
        assert_eq!(settled.winner_id, Some(2));
    }

    #[tokio::test]
    async fn unmet_reserve_ends_without_winner() {
        let setup = setup();
        let id = setup
            .store
            .create_auction(&Auction {
                reserve_price: Some(BigDecimal::from(1000)),
                ..auction()
            })
            .await
            .unwrap();
        setup.vault.submit(&request(id, 2, 500)).await.unwrap();
        setup.clock.set(start() + Duration::hours(25));

        let settled = setup.vault.determine_winner(id).await.unwrap();
        assert_eq!(settled.status, AuctionStatus::Ended);
        assert_eq!(settled.winner_id, None);
    }

    #[tokio::test]
    async fn no_bids_ends_without_winner() {
        let setup = setup();
        let id = setup.store.create_auction(&auction()).await.unwrap();
        setup.clock.set(start() + Duration::hours(25));

        let settled = setup.vault.determine_winner(id).await.unwrap();
        assert_eq!(settled.status, AuctionStatus::Ended);
        assert_eq!(settled.winner_id, None);
    }

    #[tokio::test]
    async fn undecryptable_bids_are_skipped() {
        let setup = setup();
        let id = setup.store.create_auction(&auction()).await.unwrap();
        setup.vault.submit(&request(id, 2, 900)).await.unwrap();
        setup.vault.submit(&request(id, 3, 500)).await.unwrap();
        setup.store.corrupt_sealed_bid(id, 2);
        setup.clock.set(start() + Duration::hours(25));

        // The undecryptable bid never shows up in the revealed set.
        let revealed = setup.vault.reveal(id).await.unwrap();
        assert_eq!(revealed.len(), 1);
        assert_eq!(revealed[0].bidder_id, 3);

        let settled = setup.vault.determine_winner(id).await.unwrap();
        assert_eq!(settled.status, AuctionStatus::Completed);
        assert_eq!(settled.winner_id, Some(3));
        assert_eq!(settled.current_price, BigDecimal::from(500));
    }

    #[tokio::test]
    async fn settlement_refunds_losing_deposits() {
        let setup = setup();
        let id = setup.store.create_auction(&auction()).await.unwrap();
        for user in [2, 3] {
            setup
                .store
                .save_deposit(&Deposit {
                    auction_id: id,
                    user_id: user,
                    amount: BigDecimal::from(50),
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
        }
        setup.vault.submit(&request(id, 2, 300)).await.unwrap();
        setup.vault.submit(&request(id, 3, 500)).await.unwrap();
        setup.clock.set(start() + Duration::hours(25));

        setup.vault.determine_winner(id).await.unwrap();
        let loser = setup.store.deposit(id, 2).await.unwrap().unwrap();
        assert_eq!(loser.status, DepositStatus::Refunded);
        let winner = setup.store.deposit(id, 3).await.unwrap().unwrap();
        assert_eq!(winner.status, DepositStatus::Paid);
    }

    #[tokio::test]
    async fn sweep_settles_expired_sealed_auctions() {
        let setup = setup();
        let id = setup.store.create_auction(&auction()).await.unwrap();
        setup.vault.submit(&request(id, 2, 500)).await.unwrap();
        setup.clock.set(start() + Duration::hours(25));

        assert_eq!(setup.vault.settle_expired().await.unwrap(), 1);
        let settled = setup.store.single_auction(id).await.unwrap().unwrap();
        assert_eq!(settled.status, AuctionStatus::Completed);
    }

    #[test]
    fn cipher_round_trip_and_key_validation() {
        let cipher = SealedBidCipher::new(&[7; 32]);
        let amount = BigDecimal::from(1234);
        let (ciphertext, nonce) = cipher.seal(&amount).unwrap();
        assert_eq!(cipher.open(&ciphertext, &nonce).unwrap(), amount);

        // A different key cannot open it.
        let other = SealedBidCipher::new(&[8; 32]);
        assert!(other.open(&ciphertext, &nonce).is_err());

        assert!(SealedBidCipher::from_hex("not hex").is_err());
        assert!(SealedBidCipher::from_hex("abcd").is_err());
        assert!(SealedBidCipher::from_hex(&"07".repeat(32)).is_ok());
    }
}
