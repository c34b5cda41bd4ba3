use axum::Extension;
use axum::extract::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::DateTime;
use chrono::Utc;
use database::DbConnectionPoolV2;
use database::tables::auth_user;
use diesel::ExpressionMethods;
use serde::Deserialize;
use serde::Serialize;
use serde_with::rust::double_option;
use std::sync::Arc;
use thiserror::Error;
use utoipa::IntoParams;
use utoipa::ToSchema;

use atelier_derive::AtelierError;
use atelier_models::prelude::*;

use super::AuthenticationExt;
use super::AuthorizationError;
use super::auth::AuthError;
use super::auth::hash_password;
use super::documents::check_image_content;
use super::pagination::PaginatedList as _;
use super::pagination::PaginationQueryParams;
use super::pagination::PaginationStats;
use crate::error::Result;
use crate::models::Role;
use crate::models::User;

#[derive(Debug, Error, AtelierError)]
#[atelier_error(base_id = "user")]
pub enum UserError {
    #[error("User '{user_id}', could not be found")]
    #[atelier_error(status = 404)]
    NotFound { user_id: i64 },
    #[error(transparent)]
    #[atelier_error(status = 500)]
    Database(#[from] atelier_models::Error),
}

/// The public face of an account, no email and no credentials
#[derive(Debug, Clone, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    pub display_name: Option<String>,
    /// The id of the avatar document
    pub avatar: Option<i64>,
    pub creation_date: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            avatar: user.avatar,
            creation_date: user.creation_date,
        }
    }
}

/// What an account sees of itself
#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct CurrentUserProfile {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub email: String,
    pub role: Role,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<User> for CurrentUserProfile {
    fn from(user: User) -> Self {
        Self {
            email: user.email.clone(),
            role: user.role,
            last_login: user.last_login,
            profile: user.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct UserProfileList {
    results: Vec<UserProfile>,
    #[serde(flatten)]
    stats: PaginationStats,
}

/// Returns a paginated list of user profiles
#[utoipa::path(
    get, path = "/users",
    tag = "users",
    params(PaginationQueryParams<100>),
    responses(
        (status = 200, body = inline(UserProfileList), description = "The list of profiles"),
    )
)]
pub(in crate::views) async fn list(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Query(pagination_params): Query<PaginationQueryParams<100>>,
) -> Result<Json<UserProfileList>> {
    let authorized = auth.check_roles([Role::User].into()).await?;
    if !authorized {
        return Err(AuthorizationError::Forbidden.into());
    }

    let settings = pagination_params
        .into_selection_settings()
        .order_by(|| Box::new(auth_user::username.asc()));
    let conn = &mut db_pool.get().await?;
    let (users, stats) = User::list_paginated(conn, settings)
        .await
        .map_err(UserError::Database)?;

    Ok(Json(UserProfileList {
        results: users.into_iter().map(UserProfile::from).collect(),
        stats,
    }))
}

// Documentation struct
#[derive(IntoParams)]
#[allow(unused)]
pub struct UserIdParam {
    /// The id of an account
    user_id: i64,
}

/// Retrieve a public profile
#[utoipa::path(
    get, path = "/users/{user_id}",
    tag = "users",
    params(UserIdParam),
    responses(
        (status = 200, body = UserProfile, description = "The requested profile"),
        (status = 404, description = "No account with this id"),
    )
)]
pub(in crate::views) async fn get(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(user_id): Path<i64>,
) -> Result<Json<UserProfile>> {
    let authorized = auth.check_roles([Role::User].into()).await?;
    if !authorized {
        return Err(AuthorizationError::Forbidden.into());
    }
    let conn = db_pool.get().await?;
    let user =
        User::retrieve_or_fail(conn, user_id, || UserError::NotFound { user_id }).await?;
    Ok(Json(user.into()))
}

/// Retrieve the profile of the requester
#[utoipa::path(
    get, path = "/users/me",
    tag = "users",
    responses(
        (status = 200, body = CurrentUserProfile, description = "The requester's profile"),
    )
)]
pub(in crate::views) async fn me(Extension(auth): AuthenticationExt) -> Result<Json<CurrentUserProfile>> {
    let user = auth.require_user()?;
    Ok(Json(user.into()))
}

/// Patch form for the requester's profile
#[derive(Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct UserPatchForm {
    #[schema(max_length = 128)]
    #[serde(default, with = "double_option")]
    pub display_name: Option<Option<String>>,
    #[schema(max_length = 255)]
    pub email: Option<String>,
    pub password: Option<String>,
    /// The id of the avatar document
    #[serde(default, with = "double_option")]
    pub avatar: Option<Option<i64>>,
}

/// Update the profile of the requester
#[utoipa::path(
    patch, path = "/users/me",
    tag = "users",
    request_body(content = UserPatchForm, description = "The fields to update"),
    responses(
        (status = 200, body = CurrentUserProfile, description = "The updated profile"),
    )
)]
pub(in crate::views) async fn patch(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Json(form): Json<UserPatchForm>,
) -> Result<Json<CurrentUserProfile>> {
    let mut user = auth.require_user()?;
    let mut conn = db_pool.get().await?;

    let update_avatar = match form.avatar {
        Some(Some(new_avatar)) => {
            check_image_content(&mut conn, new_avatar).await?;
            Some(Some(new_avatar))
        }
        Some(None) => Some(None),
        None => None,
    };

    // an empty changeset is not a valid UPDATE statement
    let has_field_updates =
        form.display_name.is_some() || form.email.is_some() || form.password.is_some();
    let mut changeset = User::changeset().flat_display_name(form.display_name);
    let new_email = form.email;
    if let Some(email) = &new_email {
        changeset = changeset.email(email.clone());
    }
    if let Some(password) = form.password {
        changeset = changeset.password_hash(hash_password(&password)?);
    }

    let user_id = user.id;
    if has_field_updates {
        user = changeset
            .update(&mut conn, user_id)
            .await
            .map_err(|e| match e {
                atelier_models::Error::UniqueViolation { ref column, .. } if column == "email" => {
                    AuthError::EmailTaken {
                        email: new_email.unwrap_or_default(),
                    }
                    .into()
                }
                e => crate::error::InternalError::from(UserError::Database(e)),
            })?
            .ok_or(UserError::NotFound { user_id })?;
    }
    if let Some(new_avatar) = update_avatar {
        user.update_and_prune_avatar(&mut conn, new_avatar)
            .await
            .map_err(UserError::Database)?;
    }

    Ok(Json(user.into()))
}

/// Delete an account (admin only)
#[utoipa::path(
    delete, path = "/users/{user_id}",
    tag = "users",
    params(UserIdParam),
    responses(
        (status = 204, description = "The account was deleted"),
        (status = 404, description = "No account with this id"),
    )
)]
pub(in crate::views) async fn delete(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let authorized = auth.check_roles([Role::Admin].into()).await?;
    if !authorized {
        return Err(AuthorizationError::Forbidden.into());
    }
    let conn = &mut db_pool.get().await?;
    User::delete_static_or_fail(conn, user_id, || UserError::NotFound { user_id }).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::views::test_app::TestAppBuilder;
    use crate::views::test_app::TestRequestExt;
    use crate::views::test_app::test_app;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn profile_lookup() {
        let app = TestAppBuilder::default_app();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;

        let request = app
            .get(format!("/users/{}", bob.user.id).as_str())
            .by_user(&alice);
        let profile: UserProfile = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(profile.username, "bob");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn unknown_profile_is_a_404() {
        let app = TestAppBuilder::default_app();
        let alice = app.user("alice").create().await;

        let request = app.get("/users/123456").by_user(&alice);
        app.fetch(request).await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn patch_me_updates_the_display_name() {
        let app = TestAppBuilder::default_app();
        let alice = app.user("alice").create().await;

        let request = app.patch("/users/me").by_user(&alice).json(&json!({
            "display_name": "Alice of Wonderland",
        }));
        let profile: CurrentUserProfile = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(
            profile.profile.display_name.as_deref(),
            Some("Alice of Wonderland")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn deleting_accounts_requires_the_admin_role() {
        let app = test_app!().enable_authorization(true).build();
        let admin = app.admin("root").create().await;
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;

        let request = app
            .delete(format!("/users/{}", bob.user.id).as_str())
            .by_user(&alice);
        app.fetch(request).await.assert_status(StatusCode::FORBIDDEN);

        let request = app
            .delete(format!("/users/{}", bob.user.id).as_str())
            .by_user(&admin);
        app.fetch(request)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }
}
