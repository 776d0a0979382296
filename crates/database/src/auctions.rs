use {
    crate::{AuctionId, BidId, UserId},
    sqlx::{
        PgConnection,
        QueryBuilder,
        types::{
            BigDecimal,
            chrono::{DateTime, Utc},
        },
    },
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "AuctionStatus")]
#[sqlx(rename_all = "snake_case")]
pub enum AuctionStatus {
    Scheduled,
    Active,
    Ended,
    Completed,
    Cancelled,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "AuctionType")]
#[sqlx(rename_all = "snake_case")]
pub enum AuctionType {
    English,
    SealedBid,
}

/// 1:1 mapping to the `auctions` table.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Auction {
    pub id: AuctionId,
    pub listing_id: i64,
    pub seller_id: UserId,
    pub auction_type: AuctionType,
    pub status: AuctionStatus,
    pub starting_price: BigDecimal,
    pub current_price: BigDecimal,
    pub reserve_price: Option<BigDecimal>,
    pub buy_now_price: Option<BigDecimal>,
    pub min_bid_increment: BigDecimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub auto_extend: bool,
    pub extension_minutes: i32,
    pub extension_threshold_minutes: i32,
    pub max_extensions: i32,
    pub times_extended: i32,
    pub requires_deposit: bool,
    pub deposit_amount: Option<BigDecimal>,
    pub deposit_percentage: Option<BigDecimal>,
    pub winner_id: Option<UserId>,
    pub winning_bid_id: Option<BidId>,
    pub total_bids: i32,
    pub unique_bidders: i32,
    pub version: i64,
}

const ALL_COLUMNS: &str = "id, listing_id, seller_id, auction_type, status, starting_price, \
                           current_price, reserve_price, buy_now_price, min_bid_increment, \
                           start_time, end_time, actual_end_time, auto_extend, extension_minutes, \
                           extension_threshold_minutes, max_extensions, times_extended, \
                           requires_deposit, deposit_amount, deposit_percentage, winner_id, \
                           winning_bid_id, total_bids, unique_bidders, version";

pub async fn insert(ex: &mut PgConnection, auction: &Auction) -> Result<AuctionId, sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO auctions (
    listing_id, seller_id, auction_type, status, starting_price, current_price,
    reserve_price, buy_now_price, min_bid_increment, start_time, end_time,
    auto_extend, extension_minutes, extension_threshold_minutes, max_extensions,
    times_extended, requires_deposit, deposit_amount, deposit_percentage,
    total_bids, unique_bidders, version
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
        $17, $18, $19, $20, $21, $22)
RETURNING id
    ;"#;
    let (id,) = sqlx::query_as(QUERY)
        .bind(auction.listing_id)
        .bind(auction.seller_id)
        .bind(auction.auction_type)
        .bind(auction.status)
        .bind(&auction.starting_price)
        .bind(&auction.current_price)
        .bind(&auction.reserve_price)
        .bind(&auction.buy_now_price)
        .bind(&auction.min_bid_increment)
        .bind(auction.start_time)
        .bind(auction.end_time)
        .bind(auction.auto_extend)
        .bind(auction.extension_minutes)
        .bind(auction.extension_threshold_minutes)
        .bind(auction.max_extensions)
        .bind(auction.times_extended)
        .bind(auction.requires_deposit)
        .bind(&auction.deposit_amount)
        .bind(&auction.deposit_percentage)
        .bind(auction.total_bids)
        .bind(auction.unique_bidders)
        .bind(auction.version)
        .fetch_one(ex)
        .await?;
    Ok(id)
}

pub async fn single(
    ex: &mut PgConnection,
    id: AuctionId,
) -> Result<Option<Auction>, sqlx::Error> {
    let query = format!("SELECT {ALL_COLUMNS} FROM auctions WHERE id = $1;");
    sqlx::query_as(&query).bind(id).fetch_optional(ex).await
}

pub async fn user_auctions(
    ex: &mut PgConnection,
    seller: UserId,
) -> Result<Vec<Auction>, sqlx::Error> {
    let query =
        format!("SELECT {ALL_COLUMNS} FROM auctions WHERE seller_id = $1 ORDER BY end_time ASC;");
    sqlx::query_as(&query).bind(seller).fetch_all(ex).await
}

/// Active auctions whose end time has passed; candidates for closing.
pub async fn expired(
    ex: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Auction>, sqlx::Error> {
    let query = format!(
        "SELECT {ALL_COLUMNS} FROM auctions WHERE status = 'active' AND end_time < $1 ORDER BY \
         end_time ASC;"
    );
    sqlx::query_as(&query).bind(now).fetch_all(ex).await
}

/// Scheduled auctions whose start time has been reached.
pub async fn due_to_start(
    ex: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<Auction>, sqlx::Error> {
    let query = format!(
        "SELECT {ALL_COLUMNS} FROM auctions WHERE status = 'scheduled' AND start_time <= $1 ORDER \
         BY start_time ASC;"
    );
    sqlx::query_as(&query).bind(now).fetch_all(ex).await
}

pub struct Filter {
    pub status: Option<AuctionStatus>,
    pub auction_type: Option<AuctionType>,
    pub seller_id: Option<UserId>,
    pub min_price: Option<BigDecimal>,
    pub max_price: Option<BigDecimal>,
    pub order_by: &'static str,
    pub offset: i64,
    pub limit: Option<i64>,
}

pub async fn list(ex: &mut PgConnection, filter: &Filter) -> Result<Vec<Auction>, sqlx::Error> {
    let mut query = QueryBuilder::new(format!("SELECT {ALL_COLUMNS} FROM auctions WHERE TRUE"));
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status);
    }
    if let Some(auction_type) = filter.auction_type {
        query.push(" AND auction_type = ").push_bind(auction_type);
    }
    if let Some(seller) = filter.seller_id {
        query.push(" AND seller_id = ").push_bind(seller);
    }
    if let Some(min_price) = &filter.min_price {
        query.push(" AND current_price >= ").push_bind(min_price);
    }
    if let Some(max_price) = &filter.max_price {
        query.push(" AND current_price <= ").push_bind(max_price);
    }
    // `order_by` is one of a fixed set of column expressions chosen by the
    // caller, never user input.
    query.push(format!(" ORDER BY {}", filter.order_by));
    query.push(" OFFSET ").push_bind(filter.offset);
    if let Some(limit) = filter.limit {
        query.push(" LIMIT ").push_bind(limit);
    }
    query.build_query_as().fetch_all(ex).await
}

/// Applies the price/counter/extension effects of an admitted bid. Guarded by
/// the version token; returns the number of updated rows so the caller can
/// detect a lost race (0 rows).
pub async fn update_for_bid(
    ex: &mut PgConnection,
    id: AuctionId,
    expected_version: i64,
    new_price: &BigDecimal,
    new_end_time: Option<DateTime<Utc>>,
    times_extended: i32,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE auctions
SET current_price = $3,
    end_time = COALESCE($4, end_time),
    times_extended = $5,
    version = version + 1
WHERE id = $1 AND version = $2
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(expected_version)
        .bind(new_price)
        .bind(new_end_time)
        .bind(times_extended)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

/// Recomputes the denormalized bid counters from the bid set. The counters
/// are never the source of truth.
pub async fn recount_bids(ex: &mut PgConnection, id: AuctionId) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
UPDATE auctions
SET total_bids = (SELECT COUNT(*) FROM bids WHERE auction_id = $1),
    unique_bidders = (SELECT COUNT(DISTINCT bidder_id) FROM bids WHERE auction_id = $1)
WHERE id = $1
    ;"#;
    sqlx::query(QUERY).bind(id).execute(ex).await?;
    Ok(())
}

/// Moves a scheduled auction to active. Version guarded.
pub async fn set_active(
    ex: &mut PgConnection,
    id: AuctionId,
    expected_version: i64,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE auctions
SET status = 'active', version = version + 1
WHERE id = $1 AND version = $2 AND status = 'scheduled'
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(expected_version)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

/// Terminal transition to ENDED or COMPLETED. Version guarded.
#[allow(clippy::too_many_arguments)]
pub async fn finalize(
    ex: &mut PgConnection,
    id: AuctionId,
    expected_version: i64,
    status: AuctionStatus,
    actual_end_time: DateTime<Utc>,
    winner_id: Option<UserId>,
    winning_bid_id: Option<BidId>,
    final_price: Option<&BigDecimal>,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE auctions
SET status = $3,
    actual_end_time = $4,
    winner_id = $5,
    winning_bid_id = $6,
    current_price = COALESCE($7, current_price),
    version = version + 1
WHERE id = $1 AND version = $2
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(id)
        .bind(expected_version)
        .bind(status)
        .bind(actual_end_time)
        .bind(winner_id)
        .bind(winning_bid_id)
        .bind(final_price)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}
