use axum::Extension;
use axum::extract::Json;
use axum::extract::Path;
use axum::extract::State;
use database::DbConnectionPoolV2;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use atelier_derive::AtelierError;
use atelier_models::prelude::*;

use super::ProjectError;
use super::check_project_visibility;
use crate::error::Result;
use crate::models::Project;
use crate::models::ProjectRating;
use crate::models::RatingSummary;
use crate::views::AuthenticationExt;

#[derive(Debug, Error, AtelierError)]
#[atelier_error(base_id = "rating")]
pub enum RatingError {
    #[error("Invalid score {score}, expected a value between 1 and 5")]
    #[atelier_error(status = 400)]
    InvalidScore { score: i32 },
    #[error(transparent)]
    #[atelier_error(status = 500)]
    Database(#[from] atelier_models::Error),
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(Deserialize))]
pub(in crate::views) struct RatingList {
    pub results: Vec<ProjectRating>,
    pub summary: RatingSummary,
}

/// List the ratings of a project
#[utoipa::path(
    get, path = "/projects/{project_id}/ratings",
    tag = "projects",
    params(super::ProjectIdParam),
    responses(
        (status = 200, body = inline(RatingList), description = "The ratings and their summary"),
    )
)]
pub(in crate::views) async fn list(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(project_id): Path<i64>,
) -> Result<Json<RatingList>> {
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_visibility(&mut conn, &project, &auth).await?;

    let results = ProjectRating::list_for_project(&mut conn, project_id)
        .await
        .map_err(RatingError::Database)?;
    let summary = ProjectRating::summary(&mut conn, project_id)
        .await
        .map_err(RatingError::Database)?;
    Ok(Json(RatingList { results, summary }))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct RatingForm {
    /// 1 to 5
    pub score: i32,
    #[schema(max_length = 1024)]
    pub comment: Option<String>,
}

/// Rate a project
///
/// One rating per account and project; rating again replaces the previous one.
#[utoipa::path(
    post, path = "/projects/{project_id}/ratings",
    tag = "projects",
    params(super::ProjectIdParam),
    request_body = RatingForm,
    responses(
        (status = 200, body = ProjectRating, description = "The stored rating"),
        (status = 400, description = "Score out of range"),
    )
)]
pub(in crate::views) async fn rate(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(project_id): Path<i64>,
    Json(form): Json<RatingForm>,
) -> Result<Json<ProjectRating>> {
    let user_id = auth.require_user_id()?;
    if !(1..=5).contains(&form.score) {
        return Err(RatingError::InvalidScore { score: form.score }.into());
    }
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_visibility(&mut conn, &project, &auth).await?;

    let rating = ProjectRating::upsert(&mut conn, project_id, user_id, form.score, form.comment)
        .await
        .map_err(RatingError::Database)?;
    Ok(Json(rating))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::models::fixtures::create_public_project;
    use crate::views::test_app::TestAppBuilder;
    use crate::views::test_app::TestRequestExt;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn rating_and_summary() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;
        let project = create_public_project(&mut db_pool.get_ok(), alice.user.id, "rated").await;

        let request = app
            .post(format!("/projects/{}/ratings", project.id).as_str())
            .by_user(&bob)
            .json(&json!({ "score": 4, "comment": "neat" }));
        let rating: ProjectRating = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(rating.score, 4);

        let request = app
            .get(format!("/projects/{}/ratings", project.id).as_str())
            .by_user(&alice);
        let list: RatingList = app
            .fetch(request)
            .await
            .assert_status(StatusCode::OK)
            .json_into();
        assert_eq!(list.results.len(), 1);
        assert_eq!(list.summary.count, 1);
        assert_eq!(list.summary.average, Some(4.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn out_of_range_scores_are_rejected() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let project = create_public_project(&mut db_pool.get_ok(), alice.user.id, "rated").await;

        let request = app
            .post(format!("/projects/{}/ratings", project.id).as_str())
            .by_user(&alice)
            .json(&json!({ "score": 6 }));
        app.fetch(request)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
