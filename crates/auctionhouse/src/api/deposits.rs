use {
    crate::{
        api::{AppState, error, internal_error_reply},
        deposits::DepositError,
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
pub struct PayRequest {
    pub user_id: UserId,
    pub method: String,
    pub reference: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettleRequest {
    pub reason: Option<String>,
}

pub async fn pay(
    State(state): State<AppState>,
    Path(id): Path<AuctionId>,
    Json(request): Json<PayRequest>,
) -> Response {
    match state
        .deposits
        .pay(id, request.user_id, request.method, request.reference)
        .await
    {
        Ok(deposit) => (StatusCode::CREATED, Json(deposit)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn list(State(state): State<AppState>, Path(id): Path<AuctionId>) -> Response {
    match state.deposits.auction_deposits(id).await {
        Ok(deposits) => Json(deposits).into_response(),
        Err(err) => {
            tracing::error!(?err, "list_deposits failed");
            internal_error_reply()
        }
    }
}

pub async fn single(
    State(state): State<AppState>,
    Path((id, user)): Path<(AuctionId, UserId)>,
) -> Response {
    match state.deposits.deposit(id, user).await {
        Ok(Some(deposit)) => Json(deposit).into_response(),
        Ok(None) => {
            (StatusCode::NOT_FOUND, error("NotFound", "no such deposit")).into_response()
        }
        Err(err) => {
            tracing::error!(?err, "get_deposit failed");
            internal_error_reply()
        }
    }
}

pub async fn refund(
    State(state): State<AppState>,
    Path((id, user)): Path<(AuctionId, UserId)>,
    Json(request): Json<SettleRequest>,
) -> Response {
    match state.deposits.refund(id, user, request.reason).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn forfeit(
    State(state): State<AppState>,
    Path((id, user)): Path<(AuctionId, UserId)>,
    Json(request): Json<SettleRequest>,
) -> Response {
    match state.deposits.forfeit(id, user, request.reason).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

pub async fn apply(
    State(state): State<AppState>,
    Path((id, user)): Path<(AuctionId, UserId)>,
) -> Response {
    match state.deposits.apply(id, user).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => err.into_response(),
    }
}

impl IntoResponse for DepositError {
    fn into_response(self) -> Response {
        let description = self.to_string();
        match self {
            Self::AuctionNotFound => {
                (StatusCode::NOT_FOUND, error("NotFound", description)).into_response()
            }
            Self::AuctionClosed | Self::NotRequired => {
                (StatusCode::CONFLICT, error("InvalidState", description)).into_response()
            }
            Self::SelfDeposit | Self::NotWinner => {
                (StatusCode::FORBIDDEN, error("Forbidden", description)).into_response()
            }
            Self::AlreadyPaid => (
                StatusCode::PRECONDITION_FAILED,
                error("AlreadyPaid", description),
            )
                .into_response(),
            Self::NoValidDeposit => (
                StatusCode::PRECONDITION_FAILED,
                error("NoValidDeposit", description),
            )
                .into_response(),
            Self::Other(err) => {
                tracing::error!(?err, "deposit operation failed");
                internal_error_reply()
            }
        }
    }
}
