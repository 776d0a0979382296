//! Domain types for the auction bidding engine.
//!
//! These types are plain data shared between the persistence layer and the
//! service crate. All monetary amounts are [`bigdecimal::BigDecimal`] so that
//! they round-trip through Postgres `NUMERIC` columns without loss.

pub mod auction;
pub mod bid;
pub mod deposit;
pub mod sealed_bid;

pub type AuctionId = i64;
pub type BidId = i64;
pub type UserId = i64;
pub type ListingId = i64;
