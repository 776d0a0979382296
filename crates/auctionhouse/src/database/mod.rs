pub mod auctions;
pub mod bids;
pub mod conversions;
pub mod deposits;
pub mod memory;
pub mod sealed_bids;

use sqlx::PgPool;

/// Postgres backed implementation of all storage traits.
#[derive(Clone)]
pub struct Postgres {
    pub pool: PgPool,
}

impl Postgres {
    pub fn new(uri: &str) -> sqlx::Result<Self> {
        Ok(Self {
            pool: PgPool::connect_lazy(uri)?,
        })
    }
}

/// Failure modes of guarded compound writes. `Contended` means the auction
/// row changed between the caller's read and its write; the caller re-reads,
/// re-validates and retries.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("auction changed concurrently")]
    Contended,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug)]
pub enum InsertionError {
    DuplicatedRecord,
    DbError(sqlx::Error),
}

impl From<sqlx::Error> for InsertionError {
    fn from(err: sqlx::Error) -> Self {
        if database::is_duplicate_record_error(&err) {
            Self::DuplicatedRecord
        } else {
            Self::DbError(err)
        }
    }
}

#[async_trait::async_trait]
impl observe::metrics::LivenessChecking for Postgres {
    async fn is_alive(&self) -> bool {
        sqlx::query("SELECT 1;").execute(&self.pool).await.is_ok()
    }
}
