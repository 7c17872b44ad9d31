//! Interest request routes
//!
//! Accepting a request makes the two users friends and opens their chat room.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tandem_shared::{InterestRequest, RequestStatus, RoomId};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    websocket::on_request_accepted,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SendRequestBody {
    /// Username of the recipient
    pub request_to: String,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequestBody {
    pub request_id: Uuid,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequestQuery {
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct SendRequestResponse {
    pub payload: InterestRequest,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RespondRequestResponse {
    pub payload: InterestRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
}

#[derive(Debug, Serialize)]
pub struct PendingRequestsResponse {
    pub payload: Vec<InterestRequest>,
}

#[derive(Debug, Serialize)]
pub struct CheckRequestResponse {
    pub request_sent: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Send an interest request to another user
pub async fn send_request(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<SendRequestBody>,
) -> ApiResult<(StatusCode, Json<SendRequestResponse>)> {
    let recipient = state
        .ws_state
        .resolve_identity(body.request_to.trim())
        .await?;

    if recipient.id == auth_user.user_id {
        return Err(ApiError::field(
            "request_to",
            "You cannot send a request to yourself.",
        ));
    }

    let request = state
        .store
        .create_request(&auth_user.identity(), &recipient)
        .await
        .map_err(|e| {
            if e.is_conflict() {
                ApiError::Conflict("Request already sent".to_string())
            } else {
                e.into()
            }
        })?;

    tracing::info!(
        request_id = %request.id,
        from = %auth_user.user_id,
        to = %recipient.id,
        "Interest request sent"
    );

    Ok((
        StatusCode::CREATED,
        Json(SendRequestResponse {
            payload: request,
            message: "request sent successfully".to_string(),
        }),
    ))
}

/// Accept or reject a pending request addressed to the caller
pub async fn respond_to_request(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(body): Json<RespondRequestBody>,
) -> ApiResult<Json<RespondRequestResponse>> {
    let status: RequestStatus = body
        .status
        .parse()
        .ok()
        .filter(|s| *s != RequestStatus::Pending)
        .ok_or_else(|| ApiError::field("status", "status must be 'accept' or 'reject'"))?;

    let request = state
        .store
        .find_request(body.request_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if request.request_to.id != auth_user.user_id {
        return Err(ApiError::Forbidden);
    }
    if request.status != RequestStatus::Pending {
        return Err(ApiError::Conflict(format!(
            "Request already answered with '{}'",
            request.status.as_str()
        )));
    }

    // Friendship and room are idempotent, so a retry after a partial failure
    // converges before the status is flipped
    let room_id = if status == RequestStatus::Accept {
        state
            .store
            .add_friends(request.request_from.id, request.request_to.id)
            .await?;
        let room_id = on_request_accepted(
            &*state.store,
            &request.request_from,
            &request.request_to,
        )
        .await?;
        Some(room_id)
    } else {
        None
    };

    let updated = state.store.set_request_status(request.id, status).await?;

    tracing::info!(
        request_id = %updated.id,
        status = updated.status.as_str(),
        room_id = ?room_id,
        "Interest request answered"
    );

    Ok(Json(RespondRequestResponse {
        payload: updated,
        room_id,
    }))
}

/// Pending requests addressed to the caller
pub async fn pending_requests(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<PendingRequestsResponse>> {
    let payload = state.store.pending_requests_to(auth_user.user_id).await?;
    Ok(Json(PendingRequestsResponse { payload }))
}

/// Whether the caller already sent a request to `username`
pub async fn check_request_sent(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<CheckRequestQuery>,
) -> ApiResult<Json<CheckRequestResponse>> {
    let target = state
        .ws_state
        .resolve_identity(query.username.trim())
        .await?;

    let request_sent = state
        .store
        .request_exists(auth_user.user_id, target.id)
        .await?;

    Ok(Json(CheckRequestResponse { request_sent }))
}
