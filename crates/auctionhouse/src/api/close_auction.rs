use {
    crate::{
        api::{AppState, contended_reply, error, internal_error_reply},
        lifecycle::EndAuctionError,
    },
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    model::{AuctionId, UserId},
    serde::Deserialize,
};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Request {
    pub seller_id: UserId,
}

/// Seller-initiated early close of a running auction.
pub async fn handler(
    State(state): State<AppState>,
    Path(id): Path<AuctionId>,
    Json(request): Json<Request>,
) -> Response {
    match state.lifecycle.end_auction(id, request.seller_id).await {
        Ok(auction) => Json(auction).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for EndAuctionError {
    fn into_response(self) -> Response {
        let description = self.to_string();
        match self {
            Self::NotFound => {
                (StatusCode::NOT_FOUND, error("NotFound", description)).into_response()
            }
            Self::Forbidden => {
                (StatusCode::FORBIDDEN, error("Forbidden", description)).into_response()
            }
            Self::InvalidState => {
                (StatusCode::CONFLICT, error("InvalidState", description)).into_response()
            }
            Self::Contended => contended_reply(&description),
            Self::Other(err) => {
                tracing::error!(?err, "end_auction failed");
                internal_error_reply()
            }
        }
    }
}
