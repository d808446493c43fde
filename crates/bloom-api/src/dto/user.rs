//! Current-user DTOs

use bloom_auth::{CurrentUser, ProfileUpdate};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// The authenticated account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserProfileResponse {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub telegram_id: Option<i64>,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub bonus_points: i32,
    pub address: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub preferences: Option<serde_json::Value>,
}

impl From<CurrentUser> for UserProfileResponse {
    fn from(user: CurrentUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            phone: user.phone,
            telegram_id: user.telegram_id,
            role: user.role.to_string(),
            is_active: user.is_active,
            is_verified: user.is_verified,
            bonus_points: user.bonus_points,
            address: user.address,
            preferences: user.preferences,
        }
    }
}

/// Profile changes; omitted fields stay as they are
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 255, message = "Full name must be 1-255 characters"))]
    pub full_name: Option<String>,
    #[validate(length(min = 5, max = 20, message = "Phone must be 5-20 characters"))]
    pub phone: Option<String>,
    #[validate(length(max = 500, message = "Address must be at most 500 characters"))]
    pub address: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub preferences: Option<serde_json::Value>,
}

impl From<UpdateProfileRequest> for ProfileUpdate {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            full_name: req.full_name,
            phone: req.phone,
            address: req.address,
            preferences: req.preferences,
        }
    }
}
