//! Database models - mapped from PostgreSQL tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::DbError;

// ============================================================================
// Roles
// ============================================================================

/// Account role stored in `users.role`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Regular customer
    #[default]
    Client,
    /// Back-office administrator
    Admin,
    /// Delivery courier
    Courier,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Admin => "admin",
            Self::Courier => "courier",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "admin" => Ok(Self::Admin),
            "courier" => Ok(Self::Courier),
            other => Err(DbError::InvalidInput(format!("unknown role '{}'", other))),
        }
    }
}

// ============================================================================
// User Models
// ============================================================================

/// Raw `users` row
#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub email: String,
    pub hashed_password: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub telegram_id: Option<i64>,
    pub role: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub bonus_points: i32,
    pub address: Option<String>,
    pub preferences: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user account, the source of truth that the identity cache shadows
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub hashed_password: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub telegram_id: Option<i64>,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
    pub bonus_points: i32,
    pub address: Option<String>,
    pub preferences: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl TryFrom<DbUser> for User {
    type Error = DbError;

    fn try_from(row: DbUser) -> Result<Self, Self::Error> {
        Ok(Self {
            role: row.role.parse()?,
            id: row.id,
            email: row.email,
            hashed_password: row.hashed_password,
            full_name: row.full_name,
            phone: row.phone,
            telegram_id: row.telegram_id,
            is_active: row.is_active,
            is_verified: row.is_verified,
            bonus_points: row.bonus_points,
            address: row.address,
            preferences: row.preferences,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Fields for inserting a new account
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub hashed_password: Option<String>,
    pub full_name: Option<String>,
    pub telegram_id: Option<i64>,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        for role in [UserRole::Client, UserRole::Admin, UserRole::Courier] {
            assert_eq!(role.as_str().parse::<UserRole>().unwrap(), role);
        }
        assert!("root".parse::<UserRole>().is_err());
    }

    #[test]
    fn test_row_with_bad_role_is_rejected() {
        let now = Utc::now();
        let row = DbUser {
            id: 1,
            email: "a@b.c".to_string(),
            hashed_password: None,
            full_name: None,
            phone: None,
            telegram_id: None,
            role: "superuser".to_string(),
            is_active: true,
            is_verified: false,
            bonus_points: 0,
            address: None,
            preferences: None,
            created_at: now,
            updated_at: now,
        };
        assert!(User::try_from(row).is_err());
    }
}
