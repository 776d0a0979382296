use {
    crate::api::{AppState, error, internal_error_reply},
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    model::AuctionId,
};

pub async fn handler(State(state): State<AppState>, Path(id): Path<AuctionId>) -> Response {
    match state.auctions.single_auction(id).await {
        Ok(Some(_)) => (),
        Ok(None) => {
            return (StatusCode::NOT_FOUND, error("NotFound", "no such auction")).into_response();
        }
        Err(err) => {
            tracing::error!(?err, "get_auction_bids failed");
            return internal_error_reply();
        }
    }
    match state.bids.auction_bids(id).await {
        Ok(bids) => Json(bids).into_response(),
        Err(err) => {
            tracing::error!(?err, "get_auction_bids failed");
            internal_error_reply()
        }
    }
}
