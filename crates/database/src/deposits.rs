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

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "DepositStatus")]
#[sqlx(rename_all = "snake_case")]
pub enum DepositStatus {
    Pending,
    Paid,
    Held,
    Refunded,
    Forfeited,
    Applied,
}

/// 1:1 mapping to the `deposits` table. (auction_id, user_id) is the primary
/// key, so a user holds at most one deposit row per auction.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct Deposit {
    pub auction_id: AuctionId,
    pub user_id: UserId,
    pub amount: BigDecimal,
    pub status: DepositStatus,
    pub method: String,
    pub reference: String,
    pub paid_at: DateTime<Utc>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub forfeited_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

const ALL_COLUMNS: &str = "auction_id, user_id, amount, status, method, reference, paid_at, \
                           refunded_at, forfeited_at, reason";

/// Inserts a fresh deposit or re-uses a terminal slot. Re-payment over a
/// still valid (paid/held) deposit is the caller's responsibility to reject;
/// the upsert itself simply replaces the row.
pub async fn upsert(ex: &mut PgConnection, deposit: &Deposit) -> Result<(), sqlx::Error> {
    const QUERY: &str = r#"
INSERT INTO deposits (
    auction_id, user_id, amount, status, method, reference, paid_at,
    refunded_at, forfeited_at, reason
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (auction_id, user_id) DO UPDATE
SET amount = $3, status = $4, method = $5, reference = $6, paid_at = $7,
    refunded_at = $8, forfeited_at = $9, reason = $10
    ;"#;
    sqlx::query(QUERY)
        .bind(deposit.auction_id)
        .bind(deposit.user_id)
        .bind(&deposit.amount)
        .bind(deposit.status)
        .bind(&deposit.method)
        .bind(&deposit.reference)
        .bind(deposit.paid_at)
        .bind(deposit.refunded_at)
        .bind(deposit.forfeited_at)
        .bind(&deposit.reason)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn single(
    ex: &mut PgConnection,
    auction: AuctionId,
    user: UserId,
) -> Result<Option<Deposit>, sqlx::Error> {
    let query = format!("SELECT {ALL_COLUMNS} FROM deposits WHERE auction_id = $1 AND user_id = $2;");
    sqlx::query_as(&query)
        .bind(auction)
        .bind(user)
        .fetch_optional(ex)
        .await
}

pub async fn for_auction(
    ex: &mut PgConnection,
    auction: AuctionId,
) -> Result<Vec<Deposit>, sqlx::Error> {
    let query =
        format!("SELECT {ALL_COLUMNS} FROM deposits WHERE auction_id = $1 ORDER BY user_id ASC;");
    sqlx::query_as(&query).bind(auction).fetch_all(ex).await
}

/// Transitions a valid (paid/held) deposit to a terminal status. Returns 0
/// rows when the deposit is absent or not valid, which callers map to a
/// precondition failure.
pub async fn transition(
    ex: &mut PgConnection,
    auction: AuctionId,
    user: UserId,
    to: DepositStatus,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE deposits
SET status = $3,
    reason = COALESCE($4, reason),
    refunded_at = CASE WHEN $3 = 'refunded' THEN $5 ELSE refunded_at END,
    forfeited_at = CASE WHEN $3 = 'forfeited' THEN $5 ELSE forfeited_at END
WHERE auction_id = $1 AND user_id = $2 AND status IN ('paid', 'held')
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(auction)
        .bind(user)
        .bind(to)
        .bind(reason)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

/// Refunds every valid deposit of an auction except the winner's. Invoked
/// once an auction completes.
pub async fn refund_non_winners(
    ex: &mut PgConnection,
    auction: AuctionId,
    winner: Option<UserId>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    const QUERY: &str = r#"
UPDATE deposits
SET status = 'refunded', refunded_at = $3, reason = 'auction closed'
WHERE auction_id = $1
  AND status IN ('paid', 'held')
  AND ($2::bigint IS NULL OR user_id != $2)
    ;"#;
    let result = sqlx::query(QUERY)
        .bind(auction)
        .bind(winner)
        .bind(now)
        .execute(ex)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use {super::*, sqlx::Connection};

    fn deposit(auction: AuctionId, user: UserId) -> Deposit {
        Deposit {
            auction_id: auction,
            user_id: user,
            amount: 100.into(),
            status: DepositStatus::Paid,
            method: "card".to_string(),
            reference: "ref".to_string(),
            paid_at: Utc::now(),
            refunded_at: None,
            forfeited_at: None,
            reason: None,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_upsert_and_transition() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        upsert(&mut db, &deposit(1, 10)).await.unwrap();
        let rows = transition(&mut db, 1, 10, DepositStatus::Refunded, Some("lost"), Utc::now())
            .await
            .unwrap();
        assert_eq!(rows, 1);

        // Terminal deposits cannot transition again.
        let rows = transition(&mut db, 1, 10, DepositStatus::Forfeited, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(rows, 0);

        let loaded = single(&mut db, 1, 10).await.unwrap().unwrap();
        assert_eq!(loaded.status, DepositStatus::Refunded);
        assert!(loaded.refunded_at.is_some());
    }

    #[tokio::test]
    #[ignore]
    async fn postgres_refund_non_winners_spares_winner() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        upsert(&mut db, &deposit(1, 10)).await.unwrap();
        upsert(&mut db, &deposit(1, 11)).await.unwrap();
        let refunded = refund_non_winners(&mut db, 1, Some(11), Utc::now())
            .await
            .unwrap();
        assert_eq!(refunded, 1);

        assert_eq!(
            single(&mut db, 1, 11).await.unwrap().unwrap().status,
            DepositStatus::Paid
        );
    }
}
