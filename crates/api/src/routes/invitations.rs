//! Email invitation routes.
//!
//! Invitations are head-initiated and bypass the join-request throttle.

use axum::{extract::State, Json};
use domain::models::family::{
    AcceptInvitationRequest, CancelInvitationRequest, FamilyResponse, InviteMemberRequest,
};
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::UserAuth;

/// Invite an email address into the caller's family. Head only.
///
/// POST /api/v1/families/me/invitations
pub async fn invite_member(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<InviteMemberRequest>,
) -> Result<Json<FamilyResponse>, ApiError> {
    request.validate()?;

    let family = state
        .family
        .invite_member(user_auth.user_id, &request.email)
        .await?;

    info!(
        family_id = %family.id,
        head_id = %user_auth.user_id,
        "Member invited"
    );

    Ok(Json(family.into()))
}

/// Withdraw a previously sent invitation. Head only.
///
/// POST /api/v1/families/me/invitations/cancel
pub async fn cancel_invitation(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<CancelInvitationRequest>,
) -> Result<Json<FamilyResponse>, ApiError> {
    request.validate()?;

    let family = state
        .family
        .cancel_invitation(user_auth.user_id, &request.email)
        .await?;

    info!(
        family_id = %family.id,
        head_id = %user_auth.user_id,
        "Invitation cancelled"
    );

    Ok(Json(family.into()))
}

/// Accept an email invitation to the aliased family.
///
/// POST /api/v1/invitations/accept
pub async fn accept_invitation(
    State(state): State<AppState>,
    user_auth: UserAuth,
    Json(request): Json<AcceptInvitationRequest>,
) -> Result<Json<FamilyResponse>, ApiError> {
    request.validate()?;

    let family = state
        .family
        .accept_invitation(user_auth.user_id, &request.alias)
        .await?;

    info!(
        family_id = %family.id,
        user_id = %user_auth.user_id,
        "Invitation accepted"
    );

    Ok(Json(family.into()))
}

#[cfg(test)]
mod tests {
    use domain::models::family::InviteMemberRequest;
    use validator::Validate;

    #[test]
    fn test_invite_request_rejects_bad_email() {
        let request = InviteMemberRequest {
            email: "not-an-email".to_string(),
        };
        assert!(request.validate().is_err());
    }
}
