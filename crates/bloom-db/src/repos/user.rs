//! User repository

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{DbError, DbResult, DbUser, NewUser, User};

const USER_COLUMNS: &str = "id, email, hashed_password, full_name, phone, telegram_id, role, \
     is_active, is_verified, bonus_points, address, preferences, created_at, updated_at";

/// Primary user store consumed by the auth core
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find user by ID
    async fn find_by_id(&self, id: i64) -> DbResult<Option<User>>;

    /// Find user by email (the external key of password accounts)
    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>>;

    /// Find user by Telegram numeric id
    async fn find_by_telegram_id(&self, telegram_id: i64) -> DbResult<Option<User>>;

    /// Insert a new user and read back the generated id.
    ///
    /// Fails with [`DbError::Duplicate`] when the email or Telegram id is taken.
    async fn create(&self, new_user: NewUser) -> DbResult<User>;

    /// Persist every mutable field of `user`
    async fn save(&self, user: &User) -> DbResult<User>;
}

/// PostgreSQL-backed [`UserStore`]
#[derive(Clone)]
pub struct UserRepo {
    pool: PgPool,
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, bind: FindBy<'_>) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, filter);
        let query = sqlx::query_as::<_, DbUser>(&sql);
        let query = match bind {
            FindBy::Id(id) => query.bind(id),
            FindBy::Text(text) => query.bind(text),
        };

        query
            .fetch_optional(&self.pool)
            .await?
            .map(User::try_from)
            .transpose()
    }
}

enum FindBy<'a> {
    Id(i64),
    Text(&'a str),
}

fn map_unique_violation(e: sqlx::Error, email: &str) -> DbError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.constraint() {
            Some("users_email_key") => {
                return DbError::Duplicate(format!("Email {} already exists", email));
            }
            Some("users_telegram_id_key") => {
                return DbError::Duplicate("Telegram account already linked".to_string());
            }
            _ => {}
        }
    }
    DbError::Query(e)
}

#[async_trait]
impl UserStore for UserRepo {
    async fn find_by_id(&self, id: i64) -> DbResult<Option<User>> {
        self.find_one("id", FindBy::Id(id)).await
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        self.find_one("email", FindBy::Text(email)).await
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> DbResult<Option<User>> {
        self.find_one("telegram_id", FindBy::Id(telegram_id)).await
    }

    async fn create(&self, new_user: NewUser) -> DbResult<User> {
        let sql = format!(
            r#"
            INSERT INTO users (email, hashed_password, full_name, telegram_id, role, is_active, is_verified)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let row = sqlx::query_as::<_, DbUser>(&sql)
            .bind(&new_user.email)
            .bind(&new_user.hashed_password)
            .bind(&new_user.full_name)
            .bind(new_user.telegram_id)
            .bind(new_user.role.as_str())
            .bind(new_user.is_active)
            .bind(new_user.is_verified)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, &new_user.email))?;

        User::try_from(row)
    }

    async fn save(&self, user: &User) -> DbResult<User> {
        let sql = format!(
            r#"
            UPDATE users SET
                email = $2, hashed_password = $3, full_name = $4, phone = $5,
                telegram_id = $6, role = $7, is_active = $8, is_verified = $9,
                bonus_points = $10, address = $11, preferences = $12, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        );

        let row = sqlx::query_as::<_, DbUser>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.hashed_password)
            .bind(&user.full_name)
            .bind(&user.phone)
            .bind(user.telegram_id)
            .bind(user.role.as_str())
            .bind(user.is_active)
            .bind(user.is_verified)
            .bind(user.bonus_points)
            .bind(&user.address)
            .bind(&user.preferences)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_unique_violation(e, &user.email))?
            .ok_or_else(|| DbError::NotFound(format!("user {}", user.id)))?;

        User::try_from(row)
    }
}
