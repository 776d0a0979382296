use {
    crate::api::{AppState, internal_error_reply},
    axum::{
        Json,
        extract::{Path, State},
        response::{IntoResponse, Response},
    },
    model::UserId,
};

pub async fn handler(State(state): State<AppState>, Path(seller): Path<UserId>) -> Response {
    match state.auctions.user_auctions(seller).await {
        Ok(auctions) => Json(auctions).into_response(),
        Err(err) => {
            tracing::error!(?err, "get_user_auctions failed");
            internal_error_reply()
        }
    }
}
