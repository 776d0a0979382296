use {
    crate::{
        api::{AppState, contended_reply, error, internal_error_reply},
        bidding::{BidRequest, PlaceBidError},
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
    pub max_auto_bid: Option<BigDecimal>,
}

pub async fn handler(
    State(state): State<AppState>,
    Path(auction_id): Path<AuctionId>,
    Json(request): Json<Request>,
) -> Response {
    let request = BidRequest {
        auction_id,
        bidder_id: request.bidder_id,
        amount: request.amount,
        max_auto_bid: request.max_auto_bid,
    };
    match state.bidding.place_bid(&request).await {
        Ok(bid) => (StatusCode::CREATED, Json(bid)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for PlaceBidError {
    fn into_response(self) -> Response {
        let description = self.to_string();
        match self {
            Self::AuctionNotFound => {
                (StatusCode::NOT_FOUND, error("NotFound", description)).into_response()
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
            Self::DepositRequired => (
                StatusCode::PRECONDITION_FAILED,
                error("DepositRequired", description),
            )
                .into_response(),
            Self::BelowMinimum(_) => {
                (StatusCode::BAD_REQUEST, error("BidTooLow", description)).into_response()
            }
            Self::InvalidAutoBidCeiling => (
                StatusCode::BAD_REQUEST,
                error("InvalidAutoBidCeiling", description),
            )
                .into_response(),
            Self::WrongAuctionType => {
                (StatusCode::CONFLICT, error("WrongAuctionType", description)).into_response()
            }
            Self::Contended => contended_reply(&description),
            Self::Other(err) => {
                tracing::error!(?err, "place_bid failed");
                internal_error_reply()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::api::response_body};

    #[tokio::test]
    async fn bid_too_low_carries_the_minimum() {
        let response = PlaceBidError::BelowMinimum(BigDecimal::from(1050)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value =
            serde_json::from_slice(&response_body(response).await).unwrap();
        assert_eq!(body["errorType"], "BidTooLow");
        assert_eq!(body["description"], "bid must be at least 1050");
    }

    #[tokio::test]
    async fn lifecycle_violations_are_conflicts() {
        let response = PlaceBidError::NotStarted.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = PlaceBidError::Ended.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn contention_is_a_retryable_error() {
        let response = PlaceBidError::Contended.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
