use {
    crate::{
        api::{AppState, contended_reply, error, internal_error_reply},
        vault::{RevealError, SealedBidRequest, SubmitSealedBidError},
    },
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    bigdecimal::BigDecimal,
    model::{AuctionId, UserId},
    serde::Deserialize,
};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Request {
    pub bidder_id: UserId,
    pub amount: BigDecimal,
    pub notes: Option<String>,
}

pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<AuctionId>,
    Json(request): Json<Request>,
) -> Response {
    let request = SealedBidRequest {
        auction_id: id,
        bidder_id: request.bidder_id,
        amount: request.amount,
        notes: request.notes,
    };
    match state.vault.submit(&request).await {
        // The bid serializes without its ciphertext, so this is safe to echo.
        Ok(bid) => (StatusCode::CREATED, Json(bid)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn submission_status(
    State(state): State<AppState>,
    Path((id, user)): Path<(AuctionId, UserId)>,
) -> Response {
    match state.vault.has_submitted(id, user).await {
        Ok(submitted) => Json(serde_json::json!({ "submitted": submitted })).into_response(),
        Err(err) => {
            tracing::error!(?err, "sealed bid status failed");
            internal_error_reply()
        }
    }
}

pub async fn reveal(State(state): State<AppState>, Path(id): Path<AuctionId>) -> Response {
    match state.vault.reveal(id).await {
        Ok(bids) => Json(bids).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn determine_winner(State(state): State<AppState>, Path(id): Path<AuctionId>) -> Response {
    match state.vault.determine_winner(id).await {
        Ok(auction) => Json(auction).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for SubmitSealedBidError {
    fn into_response(self) -> Response {
        let description = self.to_string();
        match self {
            Self::AuctionNotFound => {
                (StatusCode::NOT_FOUND, error("NotFound", description)).into_response()
            }
            Self::WrongAuctionType => {
                (StatusCode::CONFLICT, error("WrongAuctionType", description)).into_response()
            }
            Self::NotStarted => (
                StatusCode::CONFLICT,
                error("AuctionNotStarted", description),
            )
                .into_response(),
            Self::Ended => {
                (StatusCode::CONFLICT, error("AuctionEnded", description)).into_response()
            }
            Self::SelfBid => {
                (StatusCode::FORBIDDEN, error("SelfBid", description)).into_response()
            }
            Self::BelowStartingPrice(_) => {
                (StatusCode::BAD_REQUEST, error("BidTooLow", description)).into_response()
            }
            Self::AlreadySubmitted => (
                StatusCode::PRECONDITION_FAILED,
                error("AlreadySubmitted", description),
            )
                .into_response(),
            Self::Other(err) => {
                tracing::error!(?err, "submit_sealed_bid failed");
                internal_error_reply()
            }
        }
    }
}

impl IntoResponse for RevealError {
    fn into_response(self) -> Response {
        let description = self.to_string();
        match self {
            Self::AuctionNotFound => {
                (StatusCode::NOT_FOUND, error("NotFound", description)).into_response()
            }
            Self::WrongAuctionType => {
                (StatusCode::CONFLICT, error("WrongAuctionType", description)).into_response()
            }
            Self::StillRunning => (
                StatusCode::CONFLICT,
                error("AuctionStillRunning", description),
            )
                .into_response(),
            Self::Contended => contended_reply(&description),
            Self::Other(err) => {
                tracing::error!(?err, "sealed bid reveal failed");
                internal_error_reply()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submission_errors_follow_the_taxonomy() {
        let response =
            SubmitSealedBidError::BelowStartingPrice(BigDecimal::from(500)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = SubmitSealedBidError::Ended.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = SubmitSealedBidError::AlreadySubmitted.into_response();
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[tokio::test]
    async fn reveal_before_close_is_a_conflict() {
        let response = RevealError::StillRunning.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
