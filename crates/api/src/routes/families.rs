//! Family routes: creation, inspection, rename and membership removal.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use domain::models::family::{
    CreateFamilyRequest, FamilyResponse, RemoveMemberResponse, RenameFamilyRequest,
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;
use crate::middleware::metrics::record_family_created;

/// Create a new family with the caller as head.
///
/// POST /api/v1/families
///
/// Requires JWT authentication. The caller must not already belong to a
/// family.
pub async fn create_family(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<CreateFamilyRequest>,
) -> Result<(StatusCode, Json<FamilyResponse>), ApiError> {
    request.validate()?;

    let family = state
        .family
        .create_family(user_auth.user_id, &request.name, request.max_size)
        .await?;

    record_family_created();
    info!(
        family_id = %family.id,
        user_id = %user_auth.user_id,
        alias = %family.alias,
        "Family created"
    );

    Ok((StatusCode::CREATED, Json(family.into())))
}

/// Get the caller's family.
///
/// GET /api/v1/families/me
pub async fn my_family(
    State(state): State<AppState>,
    user_auth: UserAuth,
) -> Result<Json<FamilyResponse>, ApiError> {
    let family = state.family.my_family(user_auth.user_id).await?;
    Ok(Json(family.into()))
}

/// Rename the caller's family. Head only.
///
/// PATCH /api/v1/families/me
pub async fn rename_family(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<RenameFamilyRequest>,
) -> Result<Json<FamilyResponse>, ApiError> {
    request.validate()?;

    let family = state
        .family
        .rename_family(user_auth.user_id, &request.name)
        .await?;

    info!(
        family_id = %family.id,
        user_id = %user_auth.user_id,
        "Family renamed"
    );

    Ok(Json(family.into()))
}

/// Remove a member from the caller's family.
///
/// DELETE /api/v1/families/me/members/:user_id
///
/// The head may remove anyone; members may only remove themselves.
pub async fn remove_member(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Path(member_id): Path<Uuid>,
) -> Result<Json<RemoveMemberResponse>, ApiError> {
    let removed = state
        .family
        .remove_member(user_auth.user_id, member_id)
        .await?;

    info!(
        family_id = %removed.family_id,
        member_id = %member_id,
        actor_id = %user_auth.user_id,
        family_deleted = removed.family_deleted,
        "Member removed"
    );

    Ok(Json(removed))
}

/// Leave one's own family.
///
/// DELETE /api/v1/families/me/membership
pub async fn leave_family(
    State(state): State<AppState>,
    user_auth: UserAuth,
) -> Result<Json<RemoveMemberResponse>, ApiError> {
    let removed = state.family.leave_family(user_auth.user_id).await?;

    info!(
        family_id = %removed.family_id,
        user_id = %user_auth.user_id,
        family_deleted = removed.family_deleted,
        "Member left family"
    );

    Ok(Json(removed))
}
