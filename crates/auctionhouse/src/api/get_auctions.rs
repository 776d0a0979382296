use {
    crate::api::{AppState, error, internal_error_reply},
    axum::{
        Json,
        extract::{Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    model::auction::AuctionFilter,
};

const DEFAULT_PAGE_SIZE: i64 = 100;
const MAX_PAGE_SIZE: i64 = 500;

pub async fn handler(
    State(state): State<AppState>,
    Query(mut filter): Query<AuctionFilter>,
) -> Response {
    if filter.offset < 0 {
        return (
            StatusCode::BAD_REQUEST,
            error("InvalidArgument", "offset must not be negative"),
        )
            .into_response();
    }
    let limit = filter.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    if limit < 0 {
        return (
            StatusCode::BAD_REQUEST,
            error("InvalidArgument", "limit must not be negative"),
        )
            .into_response();
    }
    filter.limit = Some(limit.min(MAX_PAGE_SIZE));
    match state.auctions.auctions(&filter).await {
        Ok(auctions) => Json(auctions).into_response(),
        Err(err) => {
            tracing::error!(?err, "list_auctions failed");
            internal_error_reply()
        }
    }
}
