mod buy_now;
mod cancel_auction;
mod close_auction;
mod create_auction;
mod deposits;
mod get_auction;
mod get_auction_bids;
mod get_auctions;
mod get_user_auctions;
mod get_user_bids;
mod place_bid;
mod sealed_bids;

use {
    crate::{
        bidding::Bidding,
        database::{auctions::AuctionStoring, bids::BidRetrieving},
        deposits::DepositLedger,
        lifecycle::Lifecycle,
        vault::Vault,
    },
    axum::{
        Json,
        Router,
        http::{Method, StatusCode, header},
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    std::sync::Arc,
    tower_http::{
        cors::{AllowOrigin, CorsLayer},
        trace::TraceLayer,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub bidding: Arc<Bidding>,
    pub lifecycle: Arc<Lifecycle>,
    pub deposits: Arc<DepositLedger>,
    pub vault: Arc<Vault>,
    pub auctions: Arc<dyn AuctionStoring>,
    pub bids: Arc<dyn BidRetrieving>,
}

pub fn handle_all_routes(state: AppState) -> Router {
    let routes = Router::new()
        .route(
            "/v1/auctions",
            post(create_auction::handler).get(get_auctions::handler),
        )
        .route("/v1/auctions/{id}", get(get_auction::handler))
        .route(
            "/v1/auctions/{id}/bids",
            post(place_bid::handler).get(get_auction_bids::handler),
        )
        .route("/v1/auctions/{id}/buy-now", post(buy_now::handler))
        .route("/v1/auctions/{id}/close", post(close_auction::handler))
        .route("/v1/auctions/{id}/cancel", post(cancel_auction::handler))
        .route(
            "/v1/auctions/{id}/deposits",
            post(deposits::pay).get(deposits::list),
        )
        .route("/v1/auctions/{id}/deposits/{user}", get(deposits::single))
        .route(
            "/v1/auctions/{id}/deposits/{user}/refund",
            post(deposits::refund),
        )
        .route(
            "/v1/auctions/{id}/deposits/{user}/forfeit",
            post(deposits::forfeit),
        )
        .route(
            "/v1/auctions/{id}/deposits/{user}/apply",
            post(deposits::apply),
        )
        .route("/v1/auctions/{id}/sealed-bids", post(sealed_bids::submit))
        .route(
            "/v1/auctions/{id}/sealed-bids/reveal",
            post(sealed_bids::reveal),
        )
        .route(
            "/v1/auctions/{id}/sealed-bids/{user}",
            get(sealed_bids::submission_status),
        )
        .route("/v1/auctions/{id}/winner", post(sealed_bids::determine_winner))
        .route("/v1/users/{id}/bids", get(get_user_bids::handler))
        .route("/v1/users/{id}/auctions", get(get_user_auctions::handler))
        .with_state(state);
    Router::new()
        .nest("/api", routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_origin(AllowOrigin::any())
                .allow_headers([header::CONTENT_TYPE]),
        )
}

pub fn error(error_type: &str, description: impl AsRef<str>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "errorType": error_type,
        "description": description.as_ref(),
    }))
}

pub fn internal_error_reply() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        error("InternalServerError", "unexpected error"),
    )
        .into_response()
}

pub fn contended_reply(description: &str) -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, error("Contended", description)).into_response()
}

#[cfg(test)]
pub async fn response_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_body_shape() {
        let response = (StatusCode::NOT_FOUND, error("NotFound", "no such auction"))
            .into_response();
        let body: serde_json::Value =
            serde_json::from_slice(&response_body(response).await).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "errorType": "NotFound",
                "description": "no such auction",
            })
        );
    }
}
