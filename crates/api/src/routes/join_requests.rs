//! Join request routes: filing, resending, cancelling and deciding.

use axum::{extract::State, http::StatusCode, Json};
use domain::models::join_request::{
    CancelJoinRequest, DecideJoinRequest, JoinFamilyRequest, JoinRequestResponse,
    ListJoinRequestsResponse,
};
use domain::services::FamilyError;
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;
use crate::middleware::metrics::record_join_request_outcome;

/// File a join request against a family by alias.
///
/// POST /api/v1/join-requests
///
/// Requires JWT authentication. Returns the existing pending request
/// unchanged when one is already outstanding for the pair.
pub async fn create_join_request(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<JoinFamilyRequest>,
) -> Result<(StatusCode, Json<JoinRequestResponse>), ApiError> {
    request.validate()?;

    let result = state
        .family
        .request_to_join(user_auth.user_id, &request.alias, request.message)
        .await;

    let created = observe_throttle(result)?;

    info!(
        request_id = %created.id,
        family_id = %created.family_id,
        requester_id = %user_auth.user_id,
        "Join request filed"
    );

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Cancel an outstanding pending request and file a fresh one.
///
/// POST /api/v1/join-requests/resend
///
/// The cancelled row still counts against the lifetime attempt cap.
pub async fn resend_join_request(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<JoinFamilyRequest>,
) -> Result<(StatusCode, Json<JoinRequestResponse>), ApiError> {
    request.validate()?;

    let result = state
        .family
        .resend_request(user_auth.user_id, &request.alias, request.message)
        .await;

    let created = observe_throttle(result)?;

    info!(
        request_id = %created.id,
        family_id = %created.family_id,
        requester_id = %user_auth.user_id,
        "Join request resent"
    );

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Cancel the caller's own pending join request.
///
/// POST /api/v1/join-requests/cancel
pub async fn cancel_join_request(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<CancelJoinRequest>,
) -> Result<Json<JoinRequestResponse>, ApiError> {
    request.validate()?;

    let cancelled = state
        .family
        .cancel_request(user_auth.user_id, &request.alias)
        .await?;

    info!(
        request_id = %cancelled.id,
        family_id = %cancelled.family_id,
        requester_id = %user_auth.user_id,
        "Join request cancelled"
    );

    Ok(Json(cancelled.into()))
}

/// List the caller's pending join requests.
///
/// GET /api/v1/join-requests/mine
pub async fn my_join_requests(
    State(state): State<AppState>,
    user_auth: UserAuth,
) -> Result<Json<ListJoinRequestsResponse>, ApiError> {
    let requests = state.family.my_requests(user_auth.user_id).await?;

    let data: Vec<JoinRequestResponse> = requests.into_iter().map(Into::into).collect();
    let count = data.len();

    Ok(Json(ListJoinRequestsResponse { data, count }))
}

/// Accept a pending join request. Head only.
///
/// POST /api/v1/families/me/join-requests/accept
pub async fn accept_join_request(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<DecideJoinRequest>,
) -> Result<Json<JoinRequestResponse>, ApiError> {
    let accepted = state
        .family
        .accept_request(user_auth.user_id, request.requester_id)
        .await?;

    info!(
        request_id = %accepted.id,
        family_id = %accepted.family_id,
        requester_id = %request.requester_id,
        head_id = %user_auth.user_id,
        "Join request accepted"
    );

    Ok(Json(accepted.into()))
}

/// Reject a pending join request. Head only.
///
/// POST /api/v1/families/me/join-requests/reject
pub async fn reject_join_request(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<DecideJoinRequest>,
) -> Result<Json<JoinRequestResponse>, ApiError> {
    let rejected = state
        .family
        .reject_request(user_auth.user_id, request.requester_id)
        .await?;

    info!(
        request_id = %rejected.id,
        family_id = %rejected.family_id,
        requester_id = %request.requester_id,
        head_id = %user_auth.user_id,
        "Join request rejected"
    );

    Ok(Json(rejected.into()))
}

/// Record the throttle outcome before mapping the service result.
fn observe_throttle<T>(result: Result<T, FamilyError>) -> Result<T, ApiError> {
    match &result {
        Ok(_) => record_join_request_outcome("allowed"),
        Err(FamilyError::ThrottleDenied(denial)) => {
            record_join_request_outcome(denial.reason.as_str())
        }
        Err(_) => {}
    }
    result.map_err(Into::into)
}
