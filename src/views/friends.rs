use axum::Extension;
use axum::extract::Json;
use axum::extract::Path;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::DateTime;
use chrono::Utc;
use database::DbConnectionPoolV2;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use utoipa::IntoParams;
use utoipa::ToSchema;

use atelier_derive::AtelierError;
use atelier_models::prelude::*;

use super::AuthenticationExt;
use super::users::UserProfile;
use crate::error::Result;
use crate::models::Friendship;
use crate::models::FriendshipStatus;
use crate::models::User;

#[derive(Debug, Error, AtelierError)]
#[atelier_error(base_id = "friend")]
pub enum FriendError {
    #[error("User '{user_id}', could not be found")]
    #[atelier_error(status = 404)]
    UserNotFound { user_id: i64 },
    #[error("You cannot befriend yourself")]
    #[atelier_error(status = 400)]
    SelfFriendship,
    #[error("A friendship with user '{user_id}' already exists or is pending")]
    #[atelier_error(status = 409)]
    AlreadyRelated { user_id: i64 },
    #[error("Friend request '{request_id}' not found")]
    #[atelier_error(status = 404)]
    RequestNotFound { request_id: i64 },
    #[error("User '{user_id}' is not a friend")]
    #[atelier_error(status = 404)]
    NotFriends { user_id: i64 },
    #[error(transparent)]
    #[atelier_error(status = 500)]
    Database(#[from] atelier_models::Error),
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct FriendEntry {
    pub user: UserProfile,
    pub since: DateTime<Utc>,
}

/// List the requester's friends
#[utoipa::path(
    get, path = "/friends",
    tag = "friends",
    responses(
        (status = 200, body = Vec<FriendEntry>, description = "The accepted friendships"),
    )
)]
pub(in crate::views) async fn list(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
) -> Result<Json<Vec<FriendEntry>>> {
    let user_id = auth.require_user_id()?;
    let mut conn = db_pool.get().await?;

    let mut friends = Vec::new();
    for friendship in Friendship::list_for_user(&mut conn, user_id, FriendshipStatus::Accepted)
        .await
        .map_err(FriendError::Database)?
    {
        let other = friendship.other_end(user_id);
        let user = User::retrieve_or_fail(conn.clone(), other, || FriendError::UserNotFound {
            user_id: other,
        })
        .await?;
        friends.push(FriendEntry {
            user: user.into(),
            since: friendship.creation_date,
        });
    }
    Ok(Json(friends))
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct FriendRequest {
    pub request_id: i64,
    pub from: UserProfile,
    pub creation_date: DateTime<Utc>,
}

/// List the friend requests waiting for the requester's answer
#[utoipa::path(
    get, path = "/friends/requests",
    tag = "friends",
    responses(
        (status = 200, body = Vec<FriendRequest>, description = "The pending incoming requests"),
    )
)]
pub(in crate::views) async fn pending(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
) -> Result<Json<Vec<FriendRequest>>> {
    let user_id = auth.require_user_id()?;
    let mut conn = db_pool.get().await?;

    let mut requests = Vec::new();
    for friendship in Friendship::pending_for(&mut conn, user_id)
        .await
        .map_err(FriendError::Database)?
    {
        let from = User::retrieve_or_fail(conn.clone(), friendship.requester, || {
            FriendError::UserNotFound {
                user_id: friendship.requester,
            }
        })
        .await?;
        requests.push(FriendRequest {
            request_id: friendship.id,
            from: from.into(),
            creation_date: friendship.creation_date,
        });
    }
    Ok(Json(requests))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct FriendRequestForm {
    pub user_id: i64,
}

/// Send a friend request
#[utoipa::path(
    post, path = "/friends/requests",
    tag = "friends",
    request_body = FriendRequestForm,
    responses(
        (status = 201, body = Friendship, description = "The pending friendship"),
        (status = 409, description = "Already friends or already requested"),
    )
)]
pub(in crate::views) async fn request(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Json(form): Json<FriendRequestForm>,
) -> Result<impl IntoResponse> {
    let requester = auth.require_user_id()?;
    if form.user_id == requester {
        return Err(FriendError::SelfFriendship.into());
    }
    let mut conn = db_pool.get().await?;
    User::retrieve_or_fail(conn.clone(), form.user_id, || FriendError::UserNotFound {
        user_id: form.user_id,
    })
    .await?;

    // the unique constraint only covers one direction, check both
    if Friendship::between(&mut conn, requester, form.user_id)
        .await
        .map_err(FriendError::Database)?
        .is_some()
    {
        return Err(FriendError::AlreadyRelated {
            user_id: form.user_id,
        }
        .into());
    }

    let friendship = Friendship::changeset()
        .requester(requester)
        .addressee(form.user_id)
        .status(FriendshipStatus::Pending)
        .creation_date(Utc::now())
        .create(&mut conn)
        .await
        .map_err(|e| match e {
            atelier_models::Error::UniqueViolation { .. } => FriendError::AlreadyRelated {
                user_id: form.user_id,
            },
            e => FriendError::Database(e),
        })?;
    Ok((StatusCode::CREATED, Json(friendship)))
}

// Documentation struct
#[derive(IntoParams)]
#[allow(unused)]
pub struct RequestIdParam {
    /// The id of a friend request
    request_id: i64,
}

/// Accept a friend request addressed to the requester
#[utoipa::path(
    post, path = "/friends/requests/{request_id}/accept",
    tag = "friends",
    params(RequestIdParam),
    responses(
        (status = 200, body = Friendship, description = "The accepted friendship"),
        (status = 404, description = "No such pending request"),
    )
)]
pub(in crate::views) async fn accept(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(request_id): Path<i64>,
) -> Result<Json<Friendship>> {
    let user_id = auth.require_user_id()?;
    let mut conn = db_pool.get().await?;
    let mut friendship = Friendship::retrieve_or_fail(conn.clone(), request_id, || {
        FriendError::RequestNotFound { request_id }
    })
    .await?;
    // only the addressee may accept, and only once
    if friendship.addressee != user_id || friendship.status != FriendshipStatus::Pending {
        return Err(FriendError::RequestNotFound { request_id }.into());
    }

    friendship.status = FriendshipStatus::Accepted;
    friendship
        .save(&mut conn)
        .await
        .map_err(FriendError::Database)?;
    Ok(Json(friendship))
}

// Documentation struct
#[derive(IntoParams)]
#[allow(unused)]
pub struct FriendIdParam {
    /// The id of the befriended account
    user_id: i64,
}

/// Remove a friend (or withdraw/decline a pending request)
#[utoipa::path(
    delete, path = "/friends/{user_id}",
    tag = "friends",
    params(FriendIdParam),
    responses(
        (status = 204, description = "The friendship is gone"),
        (status = 404, description = "No friendship with this user"),
    )
)]
pub(in crate::views) async fn remove(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse> {
    let requester = auth.require_user_id()?;
    let mut conn = db_pool.get().await?;
    let friendship = Friendship::between(&mut conn, requester, user_id)
        .await
        .map_err(FriendError::Database)?
        .ok_or(FriendError::NotFriends { user_id })?;

    Friendship::delete_static_or_fail(&mut conn, friendship.id, || FriendError::NotFriends {
        user_id,
    })
    .await?;
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

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn friendship_lifecycle() {
        let app = TestAppBuilder::default_app();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;

        // alice asks bob
        let request = app
            .post("/friends/requests")
            .by_user(&alice)
            .json(&json!({ "user_id": bob.user.id }));
        let pending: Friendship = app
            .fetch(request)
            .await
            .assert_status(StatusCode::CREATED)
            .json_into();
        assert_eq!(pending.status, FriendshipStatus::Pending);

        // bob sees the request
        let request = app.get("/friends/requests").by_user(&bob);
        let requests: Vec<FriendRequest> = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].from.id, alice.user.id);

        // bob accepts
        let request = app
            .post(format!("/friends/requests/{}/accept", pending.id).as_str())
            .by_user(&bob);
        let accepted: Friendship = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(accepted.status, FriendshipStatus::Accepted);

        // both sides now list each other
        for (me, other) in [(&alice, &bob), (&bob, &alice)] {
            let request = app.get("/friends").by_user(me);
            let friends: Vec<FriendEntry> = app
                .fetch(request)
                .await
                .assert_status(StatusCode::OK)
                .json_into();
            assert_eq!(friends.len(), 1);
            assert_eq!(friends[0].user.id, other.user.id);
        }

        // and alice can end it
        let request = app
            .delete(format!("/friends/{}", bob.user.id).as_str())
            .by_user(&alice);
        app.fetch(request)
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn no_self_friendship() {
        let app = TestAppBuilder::default_app();
        let alice = app.user("alice").create().await;

        let request = app
            .post("/friends/requests")
            .by_user(&alice)
            .json(&json!({ "user_id": alice.user.id }));
        app.fetch(request)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn duplicate_requests_conflict_in_both_directions() {
        let app = TestAppBuilder::default_app();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;

        let request = app
            .post("/friends/requests")
            .by_user(&alice)
            .json(&json!({ "user_id": bob.user.id }));
        app.fetch(request).await.assert_status(StatusCode::CREATED);

        // same direction
        let request = app
            .post("/friends/requests")
            .by_user(&alice)
            .json(&json!({ "user_id": bob.user.id }));
        app.fetch(request).await.assert_status(StatusCode::CONFLICT);

        // reverse direction
        let request = app
            .post("/friends/requests")
            .by_user(&bob)
            .json(&json!({ "user_id": alice.user.id }));
        app.fetch(request).await.assert_status(StatusCode::CONFLICT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn only_the_addressee_accepts() {
        let app = TestAppBuilder::default_app();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;

        let request = app
            .post("/friends/requests")
            .by_user(&alice)
            .json(&json!({ "user_id": bob.user.id }));
        let pending: Friendship = app
            .fetch(request)
            .await
            .assert_status(StatusCode::CREATED)
            .json_into();

        // the requester cannot accept their own request
        let request = app
            .post(format!("/friends/requests/{}/accept", pending.id).as_str())
            .by_user(&alice);
        app.fetch(request).await.assert_status(StatusCode::NOT_FOUND);
    }
}
