//! Current-user Handlers

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::dto::{UpdateProfileRequest, UserProfileResponse};
use crate::error::{ApiResult, ErrorResponse};
use crate::extractors::{AuthenticatedUser, ValidatedJson};
use crate::state::AppState;

/// The authenticated account
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    tag = "Users",
    security(
        ("bearer" = [])
    ),
    responses(
        (status = 200, description = "Current user", body = UserProfileResponse),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse)
    )
)]
pub async fn get_me(AuthenticatedUser(user): AuthenticatedUser) -> Json<UserProfileResponse> {
    Json(user.into())
}

/// Update the authenticated account's profile
#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    tag = "Users",
    request_body = UpdateProfileRequest,
    security(
        ("bearer" = [])
    ),
    responses(
        (status = 200, description = "Updated user", body = UserProfileResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Missing, invalid or revoked token", body = ErrorResponse)
    )
)]
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    AuthenticatedUser(user): AuthenticatedUser,
    ValidatedJson(request): ValidatedJson<UpdateProfileRequest>,
) -> ApiResult<Json<UserProfileResponse>> {
    let updated = state.auth.update_profile(user.id, request.into()).await?;
    Ok(Json(updated.into()))
}
