use {
    crate::{
        api::{AppState, error, internal_error_reply},
        lifecycle::{CreateAuctionError, CreateAuctionRequest},
    },
    axum::{
        Json,
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    bigdecimal::BigDecimal,
    chrono::{DateTime, Utc},
    model::{ListingId, UserId, auction::AuctionType},
    serde::Deserialize,
};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Request {
    pub listing_id: ListingId,
    pub seller_id: UserId,
    #[serde(default)]
    pub auction_type: AuctionType,
    pub starting_price: BigDecimal,
    pub reserve_price: Option<BigDecimal>,
    pub buy_now_price: Option<BigDecimal>,
    pub min_bid_increment: BigDecimal,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub auto_extend: bool,
    #[serde(default = "default_extension_minutes")]
    pub extension_minutes: i32,
    #[serde(default = "default_extension_threshold_minutes")]
    pub extension_threshold_minutes: i32,
    #[serde(default = "default_max_extensions")]
    pub max_extensions: i32,
    #[serde(default)]
    pub requires_deposit: bool,
    pub deposit_amount: Option<BigDecimal>,
    pub deposit_percentage: Option<BigDecimal>,
}

fn default_extension_minutes() -> i32 {
    10
}

fn default_extension_threshold_minutes() -> i32 {
    5
}

fn default_max_extensions() -> i32 {
    3
}

pub async fn handler(State(state): State<AppState>, Json(request): Json<Request>) -> Response {
    let request = CreateAuctionRequest {
        listing_id: request.listing_id,
        seller_id: request.seller_id,
        auction_type: request.auction_type,
        starting_price: request.starting_price,
        reserve_price: request.reserve_price,
        buy_now_price: request.buy_now_price,
        min_bid_increment: request.min_bid_increment,
        start_time: request.start_time,
        end_time: request.end_time,
        auto_extend: request.auto_extend,
        extension_minutes: request.extension_minutes,
        extension_threshold_minutes: request.extension_threshold_minutes,
        max_extensions: request.max_extensions,
        requires_deposit: request.requires_deposit,
        deposit_amount: request.deposit_amount,
        deposit_percentage: request.deposit_percentage,
    };
    match state.lifecycle.create_auction(&request).await {
        Ok(auction) => (StatusCode::CREATED, Json(auction)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for CreateAuctionError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidArgument(description) => {
                (StatusCode::BAD_REQUEST, error("InvalidArgument", description)).into_response()
            }
            Self::Other(err) => {
                tracing::error!(?err, "create_auction failed");
                internal_error_reply()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::api::response_body};

    #[tokio::test]
    async fn invalid_argument_maps_to_bad_request() {
        let response = CreateAuctionError::InvalidArgument("end time must be after start time")
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value =
            serde_json::from_slice(&response_body(response).await).unwrap();
        assert_eq!(body["errorType"], "InvalidArgument");
    }

    #[test]
    fn deserializes_with_defaults() {
        let request: Request = serde_json::from_value(serde_json::json!({
            "listingId": 5,
            "sellerId": 1,
            "startingPrice": "1000",
            "minBidIncrement": "50",
            "startTime": "2026-03-01T12:00:00Z",
            "endTime": "2026-03-02T12:00:00Z",
        }))
        .unwrap();
        assert_eq!(request.auction_type, AuctionType::English);
        assert!(!request.auto_extend);
        assert_eq!(request.extension_minutes, 10);
        assert_eq!(request.extension_threshold_minutes, 5);
        assert_eq!(request.max_extensions, 3);
    }
}
