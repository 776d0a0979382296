use {
    crate::{AuctionId, UserId},
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

/// One sealed bid per (auction, bidder), immutable once submitted. The amount
/// is stored encrypted; `revealed_amount` is only populated after the auction
/// closes and the vault decrypts the ciphertext.
#[derive(PartialEq, Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedBid {
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    /// AES-256-GCM ciphertext of the canonical amount string.
    #[serde(skip_serializing, default)]
    pub encrypted_amount: Vec<u8>,
    /// Random 96-bit nonce stored alongside the ciphertext.
    #[serde(skip_serializing, default)]
    pub nonce: Vec<u8>,
    /// Tamper-evident digest of (auction, bidder, amount, submission time).
    pub bid_hash: String,
    pub is_revealed: bool,
    pub revealed_amount: Option<BigDecimal>,
    pub notes: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub revealed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ciphertext_is_never_serialized() {
        let bid = SealedBid {
            encrypted_amount: vec![1, 2, 3],
            nonce: vec![4, 5, 6],
            bid_hash: "abc".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&bid).unwrap();
        assert!(json.get("encryptedAmount").is_none());
        assert!(json.get("nonce").is_none());
        assert_eq!(json["bidHash"], "abc");
    }
}
