use {
    crate::api::{AppState, internal_error_reply},
    axum::{
        Json,
        extract::{Path, State},
        response::{IntoResponse, Response},
    },
    model::UserId,
};

pub async fn handler(State(state): State<AppState>, Path(user): Path<UserId>) -> Response {
    match state.bids.user_bids(user).await {
        Ok(bids) => Json(bids).into_response(),
        Err(err) => {
            tracing::error!(?err, "get_user_bids failed");
            internal_error_reply()
        }
    }
}
