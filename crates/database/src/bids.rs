use {
    crate::{AuctionId, BidId, UserId},
    sqlx::{
        PgConnection,
        types::{
            BigDecimal,
            chrono::{DateTime, Utc},
        },
    },
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "BidStatus")]
#[sqlx(rename_all = "snake_case")]
pub enum BidStatus {
    Active,
    Outbid,
    Winning,
    Won,
    Lost,
    Cancelled,
}

/// 1:1 mapping to the `bids` table. Rows are never deleted and, apart from
/// `status`, never updated.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub amount: BigDecimal,
    pub previous_bid: Option<BigDecimal>,
    pub is_auto_bid: bool,
    pub max_auto_bid: Option<BigDecimal>,
    pub status: BidStatus,
    pub created_at: DateTime<Utc>,
}

const ALL_COLUMNS: &str = "id, auction_id, bidder_id, amount, previous_bid, is_auto_bid, \
                           max_auto_bid, status, created_at";

pub async fn insert(ex: &mut PgConnection, bid: &Bid) -> Result<BidId, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO bids (
    auction_id, bidder_id, amount, previous_bid, is_auto_bid, max_auto_bid,
    status, created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
RETURNING id
    ;"#;
    let (id,) = sqlx::query_as(QUERY)
        .bind(bid.auction_id)
        .bind(bid.bidder_id)
        .bind(&bid.amount)
        .bind(&bid.previous_bid)
        .bind(bid.is_auto_bid)
        .bind(&bid.max_auto_bid)
        .bind(bid.status)
        .bind(bid.created_at)
        .fetch_one(ex)
        .await?;
    Ok(id)
}

/// All bids of an auction, newest first.
pub async fn auction_bids(
    ex: &mut PgConnection,
    auction: AuctionId,
) -> Result<Vec<Bid>, sqlx::Error> {
    let query = format!(
        "SELECT {ALL_COLUMNS} FROM bids WHERE auction_id = $1 ORDER BY created_at DESC, id DESC;"
    );
    sqlx::query_as(&query).bind(auction).fetch_all(ex).await
}

/// Bids still competing for the lead, best first. Ties on amount go to the
/// earlier bid.
pub async fn competing_bids(
    ex: &mut PgConnection,
    auction: AuctionId,
) -> Result<Vec<Bid>, sqlx::Error> {
    let query = format!(
        "SELECT {ALL_COLUMNS} FROM bids WHERE auction_id = $1 AND status IN ('active', \
         'winning') ORDER BY amount DESC, created_at ASC, id ASC;"
    );
    sqlx::query_as(&query).bind(auction).fetch_all(ex).await
}

/// All bids of a single user, newest first.
pub async fn user_bids(ex: &mut PgConnection, user: UserId) -> Result<Vec<Bid>, sqlx::Error> {
    let query = format!(
        "SELECT {ALL_COLUMNS} FROM bids WHERE bidder_id = $1 ORDER BY created_at DESC, id DESC;"
    );
    sqlx::query_as(&query).bind(user).fetch_all(ex).await
}

/// Demotes every bid still competing for the lead to OUTBID.
pub async fn outbid_competing(
    ex: &mut PgConnection,
    auction: AuctionId,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE bids
SET status = 'outbid'
WHERE auction_id = $1 AND status IN ('active', 'winning')
    ;"#;
    let result = sqlx::query(QUERY).bind(auction).execute(ex).await?;
    Ok(result.rows_affected())
}

pub async fn set_status(
    ex: &mut PgConnection,
    id: BidId,
    status: BidStatus,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "UPDATE bids SET status = $2 WHERE id = $1;";
    sqlx::query(QUERY).bind(id).bind(status).execute(ex).await?;
    Ok(())
}

/// Marks every non-terminal bid of a closed auction LOST, except the winning
/// bid if there is one.
pub async fn mark_losers(
    ex: &mut PgConnection,
    auction: AuctionId,
    winning_bid: Option<BidId>,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE bids
SET status = 'lost'
WHERE auction_id = $1
  AND status IN ('active', 'winning', 'outbid')
  AND ($2::bigint IS NULL OR id != $2)
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(auction)
        .bind(winning_bid)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}
