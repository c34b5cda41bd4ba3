pub mod collaborators;
pub mod ratings;

use axum::Extension;
use axum::extract::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::Utc;
use database::DbConnection;
use database::DbConnectionPoolV2;
use serde::Deserialize;
use serde::Serialize;
use serde_with::rust::double_option;
use std::sync::Arc;
use thiserror::Error;
use utoipa::IntoParams;
use utoipa::ToSchema;

use atelier_derive::AtelierError;
use atelier_models::Tags;
use atelier_models::prelude::*;

use super::Authentication;
use super::AuthenticationExt;
use super::AuthorizationError;
use super::documents::check_image_content;
use super::ordering::ProjectOrderingParam;
use super::pagination::PaginatedList as _;
use super::pagination::PaginationQueryParams;
use super::pagination::PaginationStats;
use crate::error::Result;
use crate::models::Project;
use crate::models::Role;

#[derive(Debug, Error, AtelierError, derive_more::From)]
#[atelier_error(base_id = "project")]
pub enum ProjectError {
    /// Couldn't find the project with the given id
    #[error("Project '{project_id}', could not be found")]
    #[atelier_error(status = 404)]
    NotFound { project_id: i64 },
    #[error(transparent)]
    #[from(forward)]
    #[atelier_error(status = 500)]
    Database(atelier_models::Error),
}

/// Creation form for a project
#[derive(Serialize, Deserialize, Default, ToSchema)]
pub(in crate::views) struct ProjectCreateForm {
    #[schema(max_length = 128)]
    pub name: String,
    #[schema(max_length = 1024)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    #[schema(max_length = 255)]
    pub tags: Tags,
    /// The id of the image document
    pub image: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(as = ProjectWithFiles)]
#[cfg_attr(test, derive(Deserialize))]
pub struct ProjectWithFileCount {
    #[serde(flatten)]
    pub project: Project,
    pub files_count: u64,
}

impl ProjectWithFileCount {
    async fn try_fetch(conn: &mut DbConnection, project: Project) -> Result<Self> {
        let files_count = project
            .files_count(conn)
            .await
            .map_err(ProjectError::from)?;
        Ok(Self {
            project,
            files_count,
        })
    }
}

/// Create a new project owned by the requester
#[utoipa::path(
    post, path = "/projects",
    tag = "projects",
    request_body = ProjectCreateForm,
    responses(
        (status = 201, body = ProjectWithFileCount, description = "The created project"),
    )
)]
pub(in crate::views) async fn create(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Json(form): Json<ProjectCreateForm>,
) -> Result<impl IntoResponse> {
    let owner = auth.require_user_id()?;
    let conn = &mut db_pool.get().await?;
    if let Some(image) = form.image {
        check_image_content(conn, image).await?;
    }
    let project = Project::changeset()
        .owner(owner)
        .name(form.name)
        .description(form.description)
        .public(form.public)
        .tags(form.tags)
        .image(form.image)
        .creation_date(Utc::now())
        .last_modification(Utc::now())
        .create(conn)
        .await
        .map_err(ProjectError::from)?;
    let project_with_files = ProjectWithFileCount::try_fetch(conn, project).await?;

    Ok((StatusCode::CREATED, Json(project_with_files)))
}

#[derive(Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct ProjectWithFileCountList {
    results: Vec<ProjectWithFileCount>,
    #[serde(flatten)]
    stats: PaginationStats,
}

/// Returns a paginated list of the projects visible to the requester
#[utoipa::path(
    get, path = "/projects",
    tag = "projects",
    params(PaginationQueryParams<1000>, ProjectOrderingParam),
    responses(
        (status = 200, body = inline(ProjectWithFileCountList), description = "The list of projects"),
    )
)]
pub(in crate::views) async fn list(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Query(pagination_params): Query<PaginationQueryParams<1000>>,
    Query(ordering_params): Query<ProjectOrderingParam>,
) -> Result<Json<ProjectWithFileCountList>> {
    let authorized = auth.check_roles([Role::User].into()).await?;
    if !authorized {
        return Err(AuthorizationError::Forbidden.into());
    }

    let ordering = ordering_params.ordering;
    let settings = pagination_params
        .into_selection_settings()
        .order_by(move || ordering.as_project_ordering());
    let settings = match &auth {
        // authorization disabled and no identity provided: list everything
        Authentication::SkipAuthorization { user: None } => settings,
        _ => Project::visibility_settings(settings, auth.user_id()?),
    };

    let conn = &mut db_pool.get().await?;
    let (projects, stats) = Project::list_paginated(conn, settings)
        .await
        .map_err(ProjectError::from)?;

    let results = projects
        .into_iter()
        .zip(db_pool.iter_conn())
        .map(|(project, conn)| async move {
            ProjectWithFileCount::try_fetch(&mut conn.await?, project).await
        });
    let results = futures::future::try_join_all(results).await?;
    Ok(Json(ProjectWithFileCountList { results, stats }))
}

// Documentation struct
#[derive(IntoParams)]
#[allow(unused)]
pub struct ProjectIdParam {
    /// The id of a project
    project_id: i64,
}

/// Retrieve a project
///
/// Each successful retrieval counts as a view.
#[utoipa::path(
    get, path = "/projects/{project_id}",
    tag = "projects",
    params(ProjectIdParam),
    responses(
        (status = 200, body = ProjectWithFileCount, description = "The requested project"),
        (status = 403, description = "The project is private"),
        (status = 404, description = "No project with this id"),
    )
)]
pub(in crate::views) async fn get(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(project_id): Path<i64>,
) -> Result<Json<ProjectWithFileCount>> {
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_visibility(&mut conn, &project, &auth).await?;

    let project = Project::increment_view_count(&mut conn, project_id)
        .await
        .map_err(ProjectError::from)?
        .ok_or(ProjectError::NotFound { project_id })?;
    Ok(Json(
        ProjectWithFileCount::try_fetch(&mut conn, project).await?,
    ))
}

/// Patch form for a project
#[derive(Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct ProjectPatchForm {
    #[schema(max_length = 128)]
    pub name: Option<String>,
    #[schema(max_length = 1024)]
    #[serde(default, with = "double_option")]
    pub description: Option<Option<String>>,
    pub public: Option<bool>,
    #[schema(max_length = 255)]
    pub tags: Option<Tags>,
    /// The id of the image document
    #[serde(default, with = "double_option")]
    pub image: Option<Option<i64>>,
}

impl From<ProjectPatchForm> for Changeset<Project> {
    fn from(project: ProjectPatchForm) -> Self {
        Project::changeset()
            .flat_name(project.name)
            .flat_description(project.description)
            .flat_public(project.public)
            .flat_tags(project.tags)
            .last_modification(Utc::now())
    }
}

/// Update a project
#[utoipa::path(
    patch, path = "/projects/{project_id}",
    tag = "projects",
    params(ProjectIdParam),
    request_body(
        content = ProjectPatchForm,
        description = "The fields to update"
    ),
    responses(
        (status = 200, body = ProjectWithFileCount, description = "The updated project"),
    )
)]
pub(in crate::views) async fn patch(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(project_id): Path<i64>,
    Json(form): Json<ProjectPatchForm>,
) -> Result<Json<ProjectWithFileCount>> {
    let user_id = auth.require_user_id()?;
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    if !project
        .editable_by(&mut conn, user_id)
        .await
        .map_err(ProjectError::from)?
    {
        return Err(AuthorizationError::Forbidden.into());
    }

    let update_image = match form.image {
        // image replacement
        Some(Some(new_image)) => {
            check_image_content(&mut conn, new_image).await?;
            Some(Some(new_image))
        }
        // image removal
        Some(None) => Some(None),
        // no image change requested, there may or may not be an image
        None => None,
    };
    let changeset: Changeset<Project> = form.into();

    let mut project = changeset
        .update_or_fail(&mut conn, project_id, || ProjectError::NotFound {
            project_id,
        })
        .await?;
    if let Some(new_doc_id) = update_image {
        project
            .update_and_prune_image(&mut conn, new_doc_id)
            .await
            .map_err(ProjectError::from)?;
    }

    Ok(Json(
        ProjectWithFileCount::try_fetch(&mut conn, project).await?,
    ))
}

/// Delete a project
#[utoipa::path(
    delete, path = "/projects/{project_id}",
    tag = "projects",
    params(ProjectIdParam),
    responses(
        (status = 204, description = "The project was deleted successfully"),
    )
)]
pub(in crate::views) async fn delete(
    Path(project_id): Path<i64>,
    Extension(auth): AuthenticationExt,
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
) -> Result<impl IntoResponse> {
    let user_id = auth.require_user_id()?;
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    // only the owner may delete, editors may not
    if project.owner != user_id {
        return Err(AuthorizationError::Forbidden.into());
    }
    project
        .delete_and_prune_documents(&mut conn)
        .await
        .map_err(ProjectError::from)?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct ForkForm {
    /// The name of the fork, defaults to the name of the origin
    #[schema(max_length = 128)]
    pub name: Option<String>,
}

/// Fork a project
///
/// Copies the project, its file tree and the file contents. The fork belongs
/// to the requester and starts private.
#[utoipa::path(
    post, path = "/projects/{project_id}/fork",
    tag = "projects",
    params(ProjectIdParam),
    request_body = ForkForm,
    responses(
        (status = 201, body = ProjectWithFileCount, description = "The fork"),
    )
)]
pub(in crate::views) async fn fork(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(project_id): Path<i64>,
    form: Option<Json<ForkForm>>,
) -> Result<impl IntoResponse> {
    let user_id = auth.require_user_id()?;
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_visibility(&mut conn, &project, &auth).await?;

    let name = form.and_then(|Json(form)| form.name);
    let fork = project
        .fork(&mut conn, user_id, name)
        .await
        .map_err(ProjectError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(ProjectWithFileCount::try_fetch(&mut conn, fork).await?),
    ))
}

/// Fails with [AuthorizationError::Forbidden] unless the requester may see the project
pub(in crate::views) async fn check_project_visibility(
    conn: &mut DbConnection,
    project: &Project,
    auth: &Authentication,
) -> Result<()> {
    if matches!(auth, Authentication::SkipAuthorization { user: None }) {
        return Ok(());
    }
    let viewer = auth.user_id()?;
    let visible = project
        .is_visible_to(conn, viewer)
        .await
        .map_err(ProjectError::from)?;
    if !visible {
        return Err(AuthorizationError::Forbidden.into());
    }
    Ok(())
}

/// Fails with [AuthorizationError::Forbidden] unless the requester may edit the project
pub(in crate::views) async fn check_project_editable(
    conn: &mut DbConnection,
    project: &Project,
    auth: &Authentication,
) -> Result<i64> {
    let user_id = auth.require_user_id()?;
    if !project
        .editable_by(conn, user_id)
        .await
        .map_err(ProjectError::from)?
    {
        return Err(AuthorizationError::Forbidden.into());
    }
    Ok(user_id)
}

#[cfg(test)]
pub mod tests {
    use super::*;

    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::models::fixtures::create_file;
    use crate::models::fixtures::create_project;
    use crate::models::fixtures::create_public_project;
    use crate::views::test_app::TestAppBuilder;
    use crate::views::test_app::TestRequestExt;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn project_post() {
        let app = TestAppBuilder::default_app();
        let pool = app.db_pool();
        let alice = app.user("alice").create().await;

        let request = app.post("/projects").by_user(&alice).json(&json!({
            "name": "playground",
            "description": "a place to break things",
            "tags": ["sandbox"],
        }));

        let response: ProjectWithFileCount = app
            .fetch(request)
            .await
            .assert_status(StatusCode::CREATED)
            .json_into();

        let project = Project::retrieve(pool.get_ok(), response.project.id)
            .await
            .expect("Failed to retrieve project")
            .expect("Project not found");

        assert_eq!(project.name, "playground");
        assert_eq!(project.owner, alice.user.id);
        assert!(!project.public);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn project_list_only_shows_visible_projects() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;

        let mine = create_project(&mut db_pool.get_ok(), alice.user.id, "mine").await;
        let public = create_public_project(&mut db_pool.get_ok(), bob.user.id, "public").await;
        let hidden = create_project(&mut db_pool.get_ok(), bob.user.id, "hidden").await;

        let request = app.get("/projects/").by_user(&alice);
        let response: ProjectWithFileCountList = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();

        let ids = response
            .results
            .iter()
            .map(|p| p.project.id)
            .collect::<Vec<_>>();
        assert!(ids.contains(&mine.id));
        assert!(ids.contains(&public.id));
        assert!(!ids.contains(&hidden.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn project_get_counts_views() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "counted").await;

        for expected in 1..=2 {
            let request = app
                .get(format!("/projects/{}", project.id).as_str())
                .by_user(&alice);
            let response: ProjectWithFileCount = app
                .fetch(request)
                .await
                .assert_status(StatusCode::OK)
                .json_into();
            assert_eq!(response.project.view_count, expected);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn private_projects_are_forbidden_to_strangers() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "secret").await;

        let request = app
            .get(format!("/projects/{}", project.id).as_str())
            .by_user(&bob);
        app.fetch(request).await.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn project_patch() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "old name").await;

        let request = app
            .patch(format!("/projects/{}", project.id).as_str())
            .by_user(&alice)
            .json(&json!({
                "name": "new name",
                "public": true,
            }));
        let response: ProjectWithFileCount = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();

        assert_eq!(response.project.name, "new name");
        assert!(response.project.public);
        assert!(response.project.last_modification > project.last_modification);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn project_delete() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "doomed").await;

        let request = app
            .delete(format!("/projects/{}", project.id).as_str())
            .by_user(&alice);
        app.fetch(request)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let exists = Project::exists(&mut db_pool.get_ok(), project.id)
            .await
            .expect("Failed to check if project exists");
        assert!(!exists);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn project_fork_responds_with_the_copy() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;
        let project =
            create_public_project(&mut db_pool.get_ok(), alice.user.id, "forkable").await;
        let _file = create_file(&mut db_pool.get_ok(), project.id, "README.md", "hi").await;

        let request = app
            .post(format!("/projects/{}/fork", project.id).as_str())
            .by_user(&bob)
            .json(&json!({ "name": "my fork" }));
        let response: ProjectWithFileCount = app
            .fetch(request)
            .await
            .assert_status(StatusCode::CREATED)
            .json_into();

        assert_eq!(response.project.name, "my fork");
        assert_eq!(response.project.owner, bob.user.id);
        assert_eq!(response.project.forked_from, Some(project.id));
        assert_eq!(response.files_count, 1);
    }
}
