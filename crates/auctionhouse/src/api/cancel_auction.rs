use {
    crate::{
        api::{AppState, contended_reply, error, internal_error_reply},
        lifecycle::CancelError,
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
    pub reason: Option<String>,
}

pub async fn handler(
    State(state): State<AppState>,
    Path(id): Path<AuctionId>,
    Json(request): Json<Request>,
) -> Response {
    match state
        .lifecycle
        .cancel(id, request.seller_id, request.reason)
        .await
    {
        Ok(auction) => Json(auction).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for CancelError {
    fn into_response(self) -> Response {
        let description = self.to_string();
        match self {
            Self::NotFound => {
                (StatusCode::NOT_FOUND, error("NotFound", description)).into_response()
            }
            Self::Forbidden => {
                (StatusCode::FORBIDDEN, error("Forbidden", description)).into_response()
            }
            Self::HasBids => {
                (StatusCode::CONFLICT, error("HasBids", description)).into_response()
            }
            Self::InvalidState => {
                (StatusCode::CONFLICT, error("InvalidState", description)).into_response()
            }
            Self::Contended => contended_reply(&description),
            Self::Other(err) => {
                tracing::error!(?err, "cancel_auction failed");
                internal_error_reply()
            }
        }
    }
}
