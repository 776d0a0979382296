use {
    crate::api::{AppState, error, internal_error_reply},
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    model::{AuctionId, auction::AuctionType},
};

/// Returns a single auction. Expired auctions settle lazily on read, so a
/// client polling an auction past its end time sees the terminal state
/// without waiting for the maintenance sweep.
pub async fn handler(State(state): State<AppState>, Path(id): Path<AuctionId>) -> Response {
    let auction = match state.auctions.single_auction(id).await {
        Ok(Some(auction)) => auction,
        Ok(None) => {
            return (StatusCode::NOT_FOUND, error("NotFound", "no such auction")).into_response();
        }
        Err(err) => {
            tracing::error!(?err, "get_auction failed");
            return internal_error_reply();
        }
    };
    let auction = if auction.status == model::auction::AuctionStatus::Active {
        let settled = match auction.auction_type {
            AuctionType::English => state.lifecycle.close(id).await.ok(),
            AuctionType::SealedBid => state.vault.determine_winner(id).await.ok(),
        };
        // Not being settleable yet (still running) is the common case.
        settled.unwrap_or(auction)
    } else {
        auction
    };
    Json(auction).into_response()
}
