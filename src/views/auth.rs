use argon2::Argon2;
use argon2::PasswordHash;
use argon2::PasswordHasher;
use argon2::PasswordVerifier;
use argon2::password_hash::SaltString;
use axum::extract::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use jsonwebtoken::Validation;
use rand_core::OsRng;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use atelier_derive::AtelierError;
use atelier_models::prelude::*;

use super::AppState;
use super::AuthConfig;
use super::users::UserProfile;
use crate::error::Result;
use crate::models::Role;
use crate::models::User;

#[derive(Debug, Error, AtelierError)]
#[atelier_error(base_id = "auth")]
pub enum AuthError {
    /// Deliberately covers both unknown-user and wrong-password, an attacker
    /// learns nothing from the distinction
    #[error("Invalid username or password")]
    #[atelier_error(status = 401)]
    InvalidCredentials,
    #[error("Username '{username}' is already taken")]
    #[atelier_error(status = 409)]
    UsernameTaken { username: String },
    #[error("Email '{email}' is already registered")]
    #[atelier_error(status = 409)]
    EmailTaken { email: String },
    #[error("The password must be at least {min_length} characters long")]
    #[atelier_error(status = 400)]
    PasswordTooShort { min_length: usize },
    #[error("password hashing failed")]
    #[atelier_error(status = 500)]
    PasswordHash,
    #[error("token signing failed")]
    #[atelier_error(status = 500)]
    TokenIssue,
    #[error(transparent)]
    #[atelier_error(status = 500)]
    Database(#[from] atelier_models::Error),
}

const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// The user id
    sub: i64,
    iat: i64,
    exp: i64,
}

pub(crate) fn issue_token(user_id: i64, auth: &AuthConfig) -> Result<String, AuthError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp(),
        exp: (now + auth.token_ttl).timestamp(),
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
    )
    .map_err(|_| AuthError::TokenIssue)
}

/// Returns the user id the token was issued for
///
/// Signature and expiration are both checked.
pub(crate) fn decode_token(
    token: &str,
    auth: &AuthConfig,
) -> std::result::Result<i64, jsonwebtoken::errors::Error> {
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims.sub)
}

pub(crate) fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

pub(crate) fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct SignupForm {
    #[schema(max_length = 64)]
    pub username: String,
    #[schema(max_length = 255)]
    pub email: String,
    pub password: String,
    #[schema(max_length = 128)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct TokenResponse {
    /// A bearer token to pass in the `Authorization` header
    pub token: String,
    pub user: UserProfile,
}

/// Create an account
#[utoipa::path(
    post, path = "/auth/signup",
    tag = "auth",
    request_body = SignupForm,
    responses(
        (status = 201, body = TokenResponse, description = "The created account and a token"),
        (status = 409, description = "Username or email already in use"),
    )
)]
pub(in crate::views) async fn signup(
    State(app_state): State<AppState>,
    Json(form): Json<SignupForm>,
) -> Result<impl IntoResponse> {
    if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::PasswordTooShort {
            min_length: MIN_PASSWORD_LENGTH,
        }
        .into());
    }

    let conn = &mut app_state.db_pool.get().await?;
    let user = User::changeset()
        .username(form.username.clone())
        .email(form.email.clone())
        .password_hash(hash_password(&form.password)?)
        .display_name(form.display_name)
        .role(Role::User)
        .creation_date(Utc::now())
        .create(conn)
        .await
        .map_err(|e| match e {
            atelier_models::Error::UniqueViolation { ref column, .. } if column == "username" => {
                AuthError::UsernameTaken {
                    username: form.username.clone(),
                }
            }
            atelier_models::Error::UniqueViolation { ref column, .. } if column == "email" => {
                AuthError::EmailTaken {
                    email: form.email.clone(),
                }
            }
            e => AuthError::Database(e),
        })?;

    let token = issue_token(user.id, &app_state.config.auth)?;
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            token,
            user: user.into(),
        }),
    ))
}

/// Log into an account
#[utoipa::path(
    post, path = "/auth/login",
    tag = "auth",
    request_body = LoginForm,
    responses(
        (status = 200, body = TokenResponse, description = "A token for the account"),
        (status = 401, description = "Invalid credentials"),
    )
)]
pub(in crate::views) async fn login(
    State(app_state): State<AppState>,
    Json(form): Json<LoginForm>,
) -> Result<Json<TokenResponse>> {
    let conn = &mut app_state.db_pool.get().await?;
    let user = User::retrieve_by_username(conn, &form.username)
        .await
        .map_err(AuthError::Database)?;
    let Some(mut user) = user else {
        return Err(AuthError::InvalidCredentials.into());
    };
    if !verify_password(&form.password, &user.password_hash) {
        return Err(AuthError::InvalidCredentials.into());
    }

    user.touch_last_login(conn).await.map_err(AuthError::Database)?;
    let token = issue_token(user.id, &app_state.config.auth)?;
    Ok(Json(TokenResponse {
        token,
        user: user.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use serde_json::json;

    use crate::models::fixtures::FIXTURE_PASSWORD;
    use crate::models::fixtures::create_user;
    use crate::views::test_app::TestAppBuilder;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn signup_returns_a_working_token() {
        let app = TestAppBuilder::default_app();

        let request = app.post("/auth/signup").json(&json!({
            "username": "ada",
            "email": "ada@example.net",
            "password": "analytical engine",
        }));
        let response: TokenResponse = app
            .fetch(request)
            .await
            .assert_status(StatusCode::CREATED)
            .json_into();
        assert_eq!(response.user.username, "ada");

        let request = app
            .get("/users/me")
            .add_header("Authorization", format!("Bearer {}", response.token));
        let me: UserProfile = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(me.username, "ada");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn signup_rejects_duplicate_usernames() {
        let app = TestAppBuilder::default_app();
        let _existing = create_user(&mut app.db_pool().get_ok(), "ada").await;

        let request = app.post("/auth/signup").json(&json!({
            "username": "ada",
            "email": "someone-else@example.net",
            "password": "analytical engine",
        }));
        app.fetch(request)
            .await
            .assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn signup_rejects_short_passwords() {
        let app = TestAppBuilder::default_app();

        let request = app.post("/auth/signup").json(&json!({
            "username": "ada",
            "email": "ada@example.net",
            "password": "short",
        }));
        app.fetch(request)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn login_accepts_the_right_password_only() {
        let app = TestAppBuilder::default_app();
        let user = create_user(&mut app.db_pool().get_ok(), "ada").await;

        let request = app.post("/auth/login").json(&json!({
            "username": "ada",
            "password": "wrong password",
        }));
        app.fetch(request)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let request = app.post("/auth/login").json(&json!({
            "username": "ada",
            "password": FIXTURE_PASSWORD,
        }));
        let response: TokenResponse = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(response.user.id, user.id);

        let reloaded = User::retrieve(app.db_pool().get_ok(), user.id)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.last_login.is_some(), "login should be stamped");
    }
}
