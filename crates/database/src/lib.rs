pub mod auctions;
pub mod bids;
pub mod deposits;
pub mod sealed_bids;

use sqlx::Executor;

// Design:
//
// Functions that execute multiple queries should take `&mut PgTransaction` to
// indicate this and to ensure that the whole function succeeds or fails
// together. Functions that execute a single query should take `&mut
// PgConnection`. We usually call the parameter `ex` for `Executor` which is
// the trait whose methods we use to run queries.
// This scheme allows callers to decide whether they want to use the function
// as part of a bigger transaction or standalone. Note that PgTransaction
// implements Deref to PgConnection. Callers do need to take care of calling
// `commit` on the transaction.
//
// For tests a useful pattern is to start a transaction at the beginning of
// the test, use it for all queries and never commit it. When the uncommitted
// transaction gets dropped it is rolled back. This allows postgres tests to
// run in parallel.

pub type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// The names of tables we use in the db.
pub const TABLES: &[&str] = &["auctions", "bids", "deposits", "sealed_bids"];

/// Delete all data in the database. Only used by tests.
#[allow(non_snake_case)]
pub async fn clear_DANGER_(ex: &mut PgTransaction<'_>) -> sqlx::Result<()> {
    for table in TABLES {
        ex.execute(format!("TRUNCATE {table};").as_str()).await?;
    }
    Ok(())
}

/// Unique constraint violations get their own error path because several
/// tables rely on them for one-row-per-key business rules.
pub fn is_duplicate_record_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(err) => err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

pub type AuctionId = i64;
pub type BidId = i64;
pub type UserId = i64;

#[cfg(test)]
mod tests {
    use {
        super::*,
        sqlx::{Connection, PgConnection},
    };

    #[tokio::test]
    #[ignore]
    async fn postgres_clear() {
        let mut con = PgConnection::connect("postgresql://").await.unwrap();
        let mut con = con.begin().await.unwrap();
        clear_DANGER_(&mut con).await.unwrap();
    }
}
