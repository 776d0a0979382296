use {
    crate::{
        api::{AppState, contended_reply, error, internal_error_reply},
        lifecycle::BuyNowError,
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
    pub buyer_id: UserId,
}

pub async fn handler(
    State(state): State<AppState>,
    Path(id): Path<AuctionId>,
    Json(request): Json<Request>,
) -> Response {
    match state.lifecycle.buy_now(id, request.buyer_id).await {
        Ok(bid) => (StatusCode::CREATED, Json(bid)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for BuyNowError {
    fn into_response(self) -> Response {
        let description = self.to_string();
        match self {
            Self::NotFound => {
                (StatusCode::NOT_FOUND, error("NotFound", description)).into_response()
            }
            Self::Unavailable => {
                (StatusCode::CONFLICT, error("BuyNowUnavailable", description)).into_response()
            }
            Self::NotStarted => (
                StatusCode::CONFLICT,
                error("AuctionNotStarted", description),
            )
                .into_response(),
            Self::Ended => {
                (StatusCode::CONFLICT, error("AuctionEnded", description)).into_response()
            }
            Self::SelfPurchase => {
                (StatusCode::FORBIDDEN, error("SelfPurchase", description)).into_response()
            }
            Self::Contended => contended_reply(&description),
            Self::Other(err) => {
                tracing::error!(?err, "buy_now failed");
                internal_error_reply()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lifecycle_violations_are_conflicts() {
        let response = BuyNowError::NotStarted.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = BuyNowError::Ended.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
