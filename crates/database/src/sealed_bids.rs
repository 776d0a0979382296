use {
    crate::{AuctionId, UserId},
    sqlx::{
        PgConnection,
        types::{
            BigDecimal,
            chrono::{DateTime, Utc},
        },
    },
};

/// 1:1 mapping to the `sealed_bids` table. (auction_id, bidder_id) is the
/// primary key; the unique violation on insert is how the one-shot rule is
/// enforced at the storage level.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct SealedBid {
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub encrypted_amount: Vec<u8>,
    pub nonce: Vec<u8>,
    pub bid_hash: String,
    pub is_revealed: bool,
    pub revealed_amount: Option<BigDecimal>,
    pub notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub revealed_at: Option<DateTime<Utc>>,
}

const ALL_COLUMNS: &str = "auction_id, bidder_id, encrypted_amount, nonce, bid_hash, is_revealed, \
                           revealed_amount, notes, submitted_at, revealed_at";

pub async fn insert(ex: &mut PgConnection, bid: &SealedBid) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO sealed_bids (
    auction_id, bidder_id, encrypted_amount, nonce, bid_hash, is_revealed,
    revealed_amount, notes, submitted_at, revealed_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ;"#;
    sqlx::query(QUERY)
        .bind(bid.auction_id)
        .bind(bid.bidder_id)
        .bind(&bid.encrypted_amount)
        .bind(&bid.nonce)
        .bind(&bid.bid_hash)
        .bind(bid.is_revealed)
        .bind(&bid.revealed_amount)
        .bind(&bid.notes)
        .bind(bid.submitted_at)
        .bind(bid.revealed_at)
        .execute(ex)
        .await?;
    Ok(())
}

/// All sealed bids of an auction in submission order.
pub async fn for_auction(
    ex: &mut PgConnection,
    auction: AuctionId,
) -> Result<Vec<SealedBid>, sqlx::Error> {
    let query = format!(
        "SELECT {ALL_COLUMNS} FROM sealed_bids WHERE auction_id = $1 ORDER BY submitted_at ASC;"
    );
    sqlx::query_as(&query).bind(auction).fetch_all(ex).await
}

pub async fn exists(
    ex: &mut PgConnection,
    auction: AuctionId,
    bidder: UserId,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str =
        "SELECT EXISTS(SELECT 1 FROM sealed_bids WHERE auction_id = $1 AND bidder_id = $2);";
    let (exists,): (bool,) = sqlx::query_as(QUERY)
        .bind(auction)
        .bind(bidder)
        .fetch_one(ex)
        .await?;
    Ok(exists)
}

/// One-directional reveal: sets the plaintext amount once the auction is
/// over. Rows already revealed are left untouched.
pub async fn mark_revealed(
    ex: &mut PgConnection,
    auction: AuctionId,
    bidder: UserId,
    amount: &BigDecimal,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE sealed_bids
SET is_revealed = TRUE, revealed_amount = $3, revealed_at = $4
WHERE auction_id = $1 AND bidder_id = $2 AND NOT is_revealed
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(auction)
        .bind(bidder)
        .bind(amount)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use {super::*, crate::is_duplicate_record_error, sqlx::Connection};

    fn sealed_bid(auction: AuctionId, bidder: UserId) -> SealedBid {
        SealedBid {
            auction_id: auction,
            bidder_id: bidder,
            encrypted_amount: vec![1, 2, 3],
            nonce: vec![0; 12],
            bid_hash: "hash".to_string(),
            is_revealed: false,
            revealed_amount: None,
            notes: None,
            submitted_at: Utc::now(),
            revealed_at: None,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_one_bid_per_user_per_auction() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        insert(&mut db, &sealed_bid(1, 10)).await.unwrap();
        let err = insert(&mut db, &sealed_bid(1, 10)).await.unwrap_err();
        assert!(is_duplicate_record_error(&err));
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_reveal_is_one_directional() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        insert(&mut db, &sealed_bid(1, 10)).await.unwrap();
        let rows = mark_revealed(&mut db, 1, 10, &300.into(), Utc::now())
            .await
            .unwrap();
        assert_eq!(rows, 1);
        let rows = mark_revealed(&mut db, 1, 10, &999.into(), Utc::now())
            .await
            .unwrap();
        assert_eq!(rows, 0);

        let bids = for_auction(&mut db, 1).await.unwrap();
        assert_eq!(bids[0].revealed_amount, Some(300.into()));
    }
}
