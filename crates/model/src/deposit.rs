use {
    crate::{AuctionId, UserId},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    strum::EnumString,
};

#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash, Default, EnumString)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "camelCase")]
pub enum DepositStatus {
    #[default]
    Pending,
    Paid,
    Held,
    /// Returned to the bidder. Terminal.
    Refunded,
    /// Kept by the platform. Terminal.
    Forfeited,
    /// Credited toward the final purchase amount. Terminal.
    Applied,
}

impl DepositStatus {
    /// Only paid or held deposits gate bid eligibility.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Paid | Self::Held)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Refunded | Self::Forfeited | Self::Applied)
    }
}

/// At most one deposit row exists per (auction, user).
#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_and_terminality() {
        assert!(DepositStatus::Paid.is_valid());
        assert!(DepositStatus::Held.is_valid());
        assert!(!DepositStatus::Pending.is_valid());
        assert!(!DepositStatus::Refunded.is_valid());

        assert!(DepositStatus::Refunded.is_terminal());
        assert!(DepositStatus::Forfeited.is_terminal());
        assert!(DepositStatus::Applied.is_terminal());
        assert!(!DepositStatus::Paid.is_terminal());
    }
}
