/// SQLite persistence for users, sessions and OTP codes

use crate::{
    accounts::types::{OtpPurpose, Role, User},
    database::{decode_ts, encode_ts},
    error::{AppError, AppResult},
};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqlitePool, SqliteRow},
    Row, SqliteConnection,
};

const USER_COLUMNS: &str = "id, name, email, password_hash, email_verified, role, created_at";

#[derive(Debug, Clone)]
pub struct AccountStorage {
    pool: SqlitePool,
}

impl AccountStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    pub async fn get_user(&self, id: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    pub async fn insert_user(
        &self,
        name: &str,
        email: &str,
        password_hash: Option<&str>,
        email_verified: bool,
        role: Role,
    ) -> AppResult<User> {
        let mut conn = self.pool.acquire().await?;
        insert_user(&mut conn, name, email, password_hash, email_verified, role).await
    }

    /// Refresh name and password of an account that has not verified its email yet
    pub async fn update_unverified_user(&self, id: &str, name: &str, password_hash: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET name = ?, password_hash = ? WHERE id = ? AND email_verified = 0")
            .bind(name)
            .bind(password_hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_verified(&self, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE users SET email_verified = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Store a session, sweeping out expired ones on the way
    pub async fn create_session(&self, user_id: &str, token_hash: &str, expires_at: DateTime<Utc>) -> AppResult<()> {
        let now = Utc::now();
        let pruned = self.prune_expired_sessions(now).await?;
        if pruned > 0 {
            tracing::debug!("🧹 Pruned {} expired sessions", pruned);
        }

        sqlx::query("INSERT INTO sessions (token_hash, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)")
            .bind(token_hash)
            .bind(user_id)
            .bind(encode_ts(&expires_at))
            .bind(encode_ts(&now))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn prune_expired_sessions(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(encode_ts(&now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// User owning an unexpired session
    pub async fn find_session_user(&self, token_hash: &str, now: DateTime<Utc>) -> AppResult<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.name, u.email, u.password_hash, u.email_verified, u.role, u.created_at
            FROM sessions s JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = ? AND s.expires_at > ?
            "#,
        )
        .bind(token_hash)
        .bind(encode_ts(&now))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    pub async fn delete_session(&self, token_hash: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Store a fresh code for (email, purpose), replacing any previous one
    pub async fn upsert_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO otp_codes (email, purpose, code_hash, attempts, expires_at, created_at)
            VALUES (?, ?, ?, 0, ?, ?)
            ON CONFLICT(email, purpose) DO UPDATE SET
                code_hash = excluded.code_hash,
                attempts = 0,
                expires_at = excluded.expires_at,
                created_at = excluded.created_at
            "#,
        )
        .bind(email)
        .bind(purpose.as_str())
        .bind(code_hash)
        .bind(encode_ts(&expires_at))
        .bind(encode_ts(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Consume a matching, unexpired, not-exhausted code in one statement.
    /// Returns false (and counts the attempt) when the code does not match.
    pub async fn consume_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code_hash: &str,
        now: DateTime<Utc>,
        max_attempts: i64,
    ) -> AppResult<bool> {
        let consumed = sqlx::query(
            r#"
            DELETE FROM otp_codes
            WHERE email = ? AND purpose = ? AND code_hash = ? AND expires_at > ? AND attempts < ?
            "#,
        )
        .bind(email)
        .bind(purpose.as_str())
        .bind(code_hash)
        .bind(encode_ts(&now))
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;

        if consumed.rows_affected() == 1 {
            return Ok(true);
        }

        sqlx::query("UPDATE otp_codes SET attempts = attempts + 1 WHERE email = ? AND purpose = ?")
            .bind(email)
            .bind(purpose.as_str())
            .execute(&self.pool)
            .await?;
        Ok(false)
    }
}

/// Insert a user on an existing connection (used inside transactions)
pub async fn insert_user(
    conn: &mut SqliteConnection,
    name: &str,
    email: &str,
    password_hash: Option<&str>,
    email_verified: bool,
    role: Role,
) -> AppResult<User> {
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: email.to_string(),
        password_hash: password_hash.map(str::to_string),
        email_verified,
        role,
        created_at: Utc::now(),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO users (id, name, email, password_hash, email_verified, role, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.id)
    .bind(&user.name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.email_verified)
    .bind(user.role.as_str())
    .bind(encode_ts(&user.created_at))
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(user),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict(
            "An account with this email already exists".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

/// Look a user up by email on an existing connection
pub async fn find_user_by_email_on(conn: &mut SqliteConnection, email: &str) -> AppResult<Option<User>> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(user_from_row).transpose()?)
}

fn user_from_row(row: &SqliteRow) -> Result<User, sqlx::Error> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        email_verified: row.try_get("email_verified")?,
        role: role.parse().map_err(|e: String| sqlx::Error::Decode(e.into()))?,
        created_at: decode_ts(row.try_get("created_at")?)?,
    })
}
