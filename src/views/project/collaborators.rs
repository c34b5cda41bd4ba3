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

use super::ProjectError;
use super::check_project_visibility;
use crate::error::Result;
use crate::models::CollaboratorRole;
use crate::models::Project;
use crate::models::ProjectCollaborator;
use crate::models::User;
use crate::views::AuthenticationExt;
use crate::views::AuthorizationError;
use crate::views::users::UserProfile;

#[derive(Debug, Error, AtelierError)]
#[atelier_error(base_id = "collaborator")]
pub enum CollaboratorError {
    #[error("User '{user_id}', could not be found")]
    #[atelier_error(status = 404)]
    UserNotFound { user_id: i64 },
    #[error("User '{user_id}' already collaborates on this project")]
    #[atelier_error(status = 409)]
    AlreadyCollaborator { user_id: i64 },
    #[error("User '{user_id}' does not collaborate on this project")]
    #[atelier_error(status = 404)]
    NotACollaborator { user_id: i64 },
    #[error("The owner of a project cannot be added as a collaborator")]
    #[atelier_error(status = 400)]
    OwnerIsNotACollaborator,
    #[error(transparent)]
    #[atelier_error(status = 500)]
    Database(#[from] atelier_models::Error),
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct Collaborator {
    pub user: UserProfile,
    pub role: CollaboratorRole,
    pub since: DateTime<Utc>,
}

/// List the collaborators of a project
#[utoipa::path(
    get, path = "/projects/{project_id}/collaborators",
    tag = "projects",
    params(super::ProjectIdParam),
    responses(
        (status = 200, body = Vec<Collaborator>, description = "The collaborators"),
    )
)]
pub(in crate::views) async fn list(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<Collaborator>>> {
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_visibility(&mut conn, &project, &auth).await?;

    let mut collaborators = Vec::new();
    for collaborator in ProjectCollaborator::list_for_project(&mut conn, project_id)
        .await
        .map_err(CollaboratorError::Database)?
    {
        let user = User::retrieve_or_fail(conn.clone(), collaborator.user, || {
            CollaboratorError::UserNotFound {
                user_id: collaborator.user,
            }
        })
        .await?;
        collaborators.push(Collaborator {
            user: user.into(),
            role: collaborator.role,
            since: collaborator.creation_date,
        });
    }
    Ok(Json(collaborators))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct CollaboratorForm {
    pub user_id: i64,
    pub role: CollaboratorRole,
}

/// Add a collaborator to a project (owner only)
#[utoipa::path(
    post, path = "/projects/{project_id}/collaborators",
    tag = "projects",
    params(super::ProjectIdParam),
    request_body = CollaboratorForm,
    responses(
        (status = 201, body = Collaborator, description = "The added collaborator"),
        (status = 409, description = "Already a collaborator"),
    )
)]
pub(in crate::views) async fn add(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(project_id): Path<i64>,
    Json(form): Json<CollaboratorForm>,
) -> Result<impl IntoResponse> {
    let requester = auth.require_user_id()?;
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    if project.owner != requester {
        return Err(AuthorizationError::Forbidden.into());
    }
    if form.user_id == project.owner {
        return Err(CollaboratorError::OwnerIsNotACollaborator.into());
    }
    let user = User::retrieve_or_fail(conn.clone(), form.user_id, || {
        CollaboratorError::UserNotFound {
            user_id: form.user_id,
        }
    })
    .await?;

    let collaborator = ProjectCollaborator::changeset()
        .project(project_id)
        .user(form.user_id)
        .role(form.role)
        .creation_date(Utc::now())
        .create(&mut conn)
        .await
        .map_err(|e| match e {
            atelier_models::Error::UniqueViolation { .. } => {
                CollaboratorError::AlreadyCollaborator {
                    user_id: form.user_id,
                }
            }
            e => CollaboratorError::Database(e),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(Collaborator {
            user: user.into(),
            role: collaborator.role,
            since: collaborator.creation_date,
        }),
    ))
}

// Documentation struct
#[derive(IntoParams)]
#[allow(unused)]
pub struct CollaboratorIdParams {
    /// The id of a project
    project_id: i64,
    /// The id of the collaborating account
    user_id: i64,
}

/// Remove a collaborator from a project (owner only)
#[utoipa::path(
    delete, path = "/projects/{project_id}/collaborators/{user_id}",
    tag = "projects",
    params(CollaboratorIdParams),
    responses(
        (status = 204, description = "The collaborator was removed"),
        (status = 404, description = "Not a collaborator"),
    )
)]
pub(in crate::views) async fn remove(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path((project_id, user_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse> {
    let requester = auth.require_user_id()?;
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    if project.owner != requester {
        return Err(AuthorizationError::Forbidden.into());
    }

    let removed = ProjectCollaborator::remove(&mut conn, project_id, user_id)
        .await
        .map_err(CollaboratorError::Database)?;
    if !removed {
        return Err(CollaboratorError::NotACollaborator { user_id }.into());
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::models::fixtures::create_project;
    use crate::views::test_app::TestAppBuilder;
    use crate::views::test_app::TestRequestExt;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn collaborator_lifecycle() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "shared").await;

        // add
        let request = app
            .post(format!("/projects/{}/collaborators", project.id).as_str())
            .by_user(&alice)
            .json(&json!({ "user_id": bob.user.id, "role": "editor" }));
        let added: Collaborator = app
            .fetch(request)
            .await
            .assert_status(StatusCode::CREATED)
            .json_into();
        assert_eq!(added.user.id, bob.user.id);
        assert_eq!(added.role, CollaboratorRole::Editor);

        // adding twice conflicts
        let request = app
            .post(format!("/projects/{}/collaborators", project.id).as_str())
            .by_user(&alice)
            .json(&json!({ "user_id": bob.user.id, "role": "viewer" }));
        app.fetch(request).await.assert_status(StatusCode::CONFLICT);

        // the collaborator now sees the private project
        let request = app
            .get(format!("/projects/{}", project.id).as_str())
            .by_user(&bob);
        app.fetch(request).await.assert_status(StatusCode::OK);

        // remove
        let request = app
            .delete(
                format!("/projects/{}/collaborators/{}", project.id, bob.user.id).as_str(),
            )
            .by_user(&alice);
        app.fetch(request)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let request = app
            .get(format!("/projects/{}/collaborators", project.id).as_str())
            .by_user(&alice);
        let collaborators: Vec<Collaborator> = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert!(collaborators.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn only_the_owner_manages_collaborators() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;
        let carol = app.user("carol").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "shared").await;

        let request = app
            .post(format!("/projects/{}/collaborators", project.id).as_str())
            .by_user(&bob)
            .json(&json!({ "user_id": carol.user.id, "role": "viewer" }));
        app.fetch(request).await.assert_status(StatusCode::FORBIDDEN);
    }
}
