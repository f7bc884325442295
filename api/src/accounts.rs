//! User accounts, password hashing and cookie-backed login sessions.

use anyhow::{anyhow, Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sqlx::sqlite::SqlitePool;

use crate::error::AppError;
use crate::models::{Session, User};
use crate::AppState;

pub const SESSION_COOKIE: &str = "sessionid";
const TOKEN_LENGTH: usize = 64;
const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_USERNAME_LENGTH: usize = 150;

const USER_COLUMNS: &str = "id, username, email, password_hash, is_staff, date_joined";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignupError {
    #[error("username is required")]
    MissingUsername,
    #[error("username must be at most 150 characters")]
    UsernameTooLong,
    #[error("a valid email address is required")]
    InvalidEmail,
    #[error("the two password fields didn't match")]
    PasswordMismatch,
    #[error("password must contain at least 8 characters")]
    PasswordTooShort,
}

/// Signup form fields, validated before any storage access.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

impl SignupForm {
    pub fn validate(&self) -> Result<(), SignupError> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(SignupError::MissingUsername);
        }
        if username.chars().count() > MAX_USERNAME_LENGTH {
            return Err(SignupError::UsernameTooLong);
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(SignupError::InvalidEmail);
        }
        if self.password1 != self.password2 {
            return Err(SignupError::PasswordMismatch);
        }
        if self.password1.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(SignupError::PasswordTooShort);
        }
        Ok(())
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {}", e))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is malformed: {}", e);
            false
        }
    }
}

fn generate_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

pub async fn create_user(pool: &SqlitePool, form: &SignupForm) -> Result<User> {
    let password_hash = hash_password(&form.password1)?;
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (username, email, password_hash, is_staff, date_joined) VALUES (?, ?, ?, 0, ?) RETURNING {}",
        USER_COLUMNS
    ))
    .bind(form.username.trim())
    .bind(form.email.trim())
    .bind(&password_hash)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    tracing::info!("created user '{}'", user.username);
    Ok(user)
}

pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn get_user_by_username(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE username = ?",
        USER_COLUMNS
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

/// Returns the user when `password` matches.
pub async fn authenticate(pool: &SqlitePool, username: &str, password: &str) -> Result<Option<User>> {
    let Some(user) = get_user_by_username(pool, username.trim()).await? else {
        return Ok(None);
    };
    if verify_password(password, &user.password_hash) {
        Ok(Some(user))
    } else {
        Ok(None)
    }
}

pub async fn set_staff(pool: &SqlitePool, username: &str, is_staff: bool) -> Result<bool> {
    let result = sqlx::query("UPDATE users SET is_staff = ? WHERE username = ?")
        .bind(is_staff)
        .bind(username)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes the user; their comments, ratings, sessions and profile go with
/// them while their page views stay, detached.
pub async fn delete_user(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Opens a new login session and returns its token.
pub async fn create_session(pool: &SqlitePool, user_id: i64) -> Result<String> {
    let token = generate_token();
    let now = Utc::now();
    sqlx::query("INSERT INTO sessions (token, user_id, created_at, last_used_at) VALUES (?, ?, ?, ?)")
        .bind(&token)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("failed to store session")?;
    Ok(token)
}

pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// A resolved login session.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub session_id: i64,
    pub user: User,
}

/// Resolves the user behind a session token, touching the session's last use.
pub async fn resolve_session(pool: &SqlitePool, token: &str) -> Result<Option<SessionUser>> {
    let session = sqlx::query_as::<_, Session>(
        "SELECT id, token, user_id, created_at, last_used_at FROM sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let Some(session) = session else {
        return Ok(None);
    };

    sqlx::query("UPDATE sessions SET last_used_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(session.id)
        .execute(pool)
        .await?;

    Ok(get_user(pool, session.user_id).await?.map(|user| SessionUser {
        session_id: session.id,
        user,
    }))
}

/// Session token carried by the request's cookie header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

pub async fn session_from_headers(pool: &SqlitePool, headers: &HeaderMap) -> Result<Option<SessionUser>> {
    match session_token(headers) {
        Some(token) => resolve_session(pool, &token).await,
        None => Ok(None),
    }
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

/// The logged-in user; rejects anonymous requests with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session_id: i64,
    pub user: User,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = session_from_headers(&state.db, &parts.headers)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(CurrentUser {
            session_id: session.session_id,
            user: session.user,
        })
    }
}

/// A logged-in staff member; 401 when anonymous, 403 when not staff.
#[derive(Debug, Clone)]
pub struct StaffUser(pub User);

#[axum::async_trait]
impl FromRequestParts<AppState> for StaffUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let current = CurrentUser::from_request_parts(parts, state).await?;
        if current.user.is_staff {
            Ok(StaffUser(current.user))
        } else {
            Err(AppError::Forbidden)
        }
    }
}
