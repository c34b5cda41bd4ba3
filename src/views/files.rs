use axum::Extension;
use axum::body::Bytes;
use axum::extract::Json;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use chrono::Utc;
use database::DbConnection;
use database::DbConnectionPoolV2;
use database::tables::file_node;
use diesel::ExpressionMethods;
use diesel::TextExpressionMethods;
use diesel_async::scoped_futures::ScopedFutureExt;
use serde::Deserialize;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use utoipa::IntoParams;
use utoipa::ToSchema;

use atelier_derive::AtelierError;
use atelier_models::Document;
use atelier_models::prelude::*;

use super::AuthenticationExt;
use super::project::ProjectError;
use super::project::check_project_editable;
use super::project::check_project_visibility;
use crate::error::Result;
use crate::models::FileKind;
use crate::models::FileNode;
use crate::models::Project;

#[derive(Debug, Error, AtelierError)]
#[atelier_error(base_id = "file")]
pub enum FileError {
    #[error("File '{file_id}', could not be found")]
    #[atelier_error(status = 404)]
    NotFound { file_id: i64 },
    #[error("A file already exists at '{path}'")]
    #[atelier_error(status = 400)]
    DuplicatePath { path: String },
    #[error("Invalid path '{path}'")]
    #[atelier_error(status = 400)]
    InvalidPath { path: String },
    #[error("File '{file_id}' is a directory and has no content")]
    #[atelier_error(status = 400)]
    NotAFile { file_id: i64 },
    #[error(transparent)]
    #[atelier_error(status = 500)]
    Database(#[from] atelier_models::Error),
}

impl From<database::DatabaseError> for FileError {
    fn from(e: database::DatabaseError) -> Self {
        Self::Database(e.into())
    }
}

/// Paths are slash-separated, relative, and free of empty or dotted segments
fn check_path(path: &str) -> Result<(), FileError> {
    let valid = !path.is_empty()
        && !path.starts_with('/')
        && !path.ends_with('/')
        && path
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
    if !valid {
        return Err(FileError::InvalidPath {
            path: path.to_owned(),
        });
    }
    Ok(())
}

async fn retrieve_project_file(
    conn: DbConnection,
    project_id: i64,
    file_id: i64,
) -> Result<FileNode> {
    let node =
        FileNode::retrieve_or_fail(conn, file_id, || FileError::NotFound { file_id }).await?;
    // ids are global, make sure the node is reached through its own project
    if node.project != project_id {
        return Err(FileError::NotFound { file_id }.into());
    }
    Ok(node)
}

/// Creation form for a file tree node
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct FileCreateForm {
    #[schema(max_length = 4096)]
    pub path: String,
    pub kind: FileKind,
    /// Initial text content, files only
    pub content: Option<String>,
}

/// Create a file or a directory in a project
#[utoipa::path(
    post, path = "/projects/{project_id}/files",
    tag = "files",
    params(super::project::ProjectIdParam),
    request_body = FileCreateForm,
    responses(
        (status = 201, body = FileNode, description = "The created node"),
        (status = 400, description = "Duplicate or invalid path"),
    )
)]
pub(in crate::views) async fn create(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(project_id): Path<i64>,
    Json(form): Json<FileCreateForm>,
) -> Result<impl IntoResponse> {
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_editable(&mut conn, &project, &auth).await?;
    check_path(&form.path)?;

    if form.kind == FileKind::Directory && form.content.is_some() {
        return Err(FileError::InvalidPath { path: form.path }.into());
    }

    let document = match form.kind {
        FileKind::File => {
            let content = form.content.unwrap_or_default();
            let document = Document::changeset()
                .content_type(mime::TEXT_PLAIN_UTF_8.to_string())
                .data(content.into_bytes())
                .create(&mut conn)
                .await
                .map_err(FileError::Database)?;
            Some(document.id)
        }
        FileKind::Directory => None,
    };

    let node = FileNode::changeset()
        .project(project_id)
        .path(form.path.clone())
        .kind(form.kind)
        .document(document)
        .creation_date(Utc::now())
        .last_modification(Utc::now())
        .create(&mut conn)
        .await
        .map_err(|e| match e {
            atelier_models::Error::UniqueViolation { .. } => {
                FileError::DuplicatePath { path: form.path }
            }
            e => FileError::Database(e),
        })?;

    Ok((StatusCode::CREATED, Json(node)))
}

/// List the file tree of a project, path-ordered
#[utoipa::path(
    get, path = "/projects/{project_id}/files",
    tag = "files",
    params(super::project::ProjectIdParam),
    responses(
        (status = 200, body = Vec<FileNode>, description = "The nodes of the project"),
    )
)]
pub(in crate::views) async fn list(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<FileNode>>> {
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_visibility(&mut conn, &project, &auth).await?;

    let nodes = FileNode::list(
        &mut conn,
        SelectionSettings::new()
            .filter(move || file_node::project_id.eq(project_id))
            .order_by(|| Box::new(file_node::path.asc())),
    )
    .await
    .map_err(FileError::Database)?;
    Ok(Json(nodes))
}

// Documentation struct
#[derive(IntoParams)]
#[allow(unused)]
pub struct FileIdParams {
    /// The id of a project
    project_id: i64,
    /// The id of a file tree node
    file_id: i64,
}

/// Retrieve a file tree node
#[utoipa::path(
    get, path = "/projects/{project_id}/files/{file_id}",
    tag = "files",
    params(FileIdParams),
    responses(
        (status = 200, body = FileNode, description = "The requested node"),
    )
)]
pub(in crate::views) async fn get(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path((project_id, file_id)): Path<(i64, i64)>,
) -> Result<Json<FileNode>> {
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_visibility(&mut conn, &project, &auth).await?;
    let node = retrieve_project_file(conn, project_id, file_id).await?;
    Ok(Json(node))
}

/// Retrieve the text content of a file
#[utoipa::path(
    get, path = "/projects/{project_id}/files/{file_id}/content",
    tag = "files",
    params(FileIdParams),
    responses(
        (status = 200, body = String, description = "The content with its content type"),
        (status = 400, description = "The node is a directory"),
    )
)]
pub(in crate::views) async fn get_content(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path((project_id, file_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse> {
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_visibility(&mut conn, &project, &auth).await?;
    let node = retrieve_project_file(conn.clone(), project_id, file_id).await?;

    let document_key = node.document.ok_or(FileError::NotAFile { file_id })?;
    let document = Document::retrieve_or_fail(conn, document_key, || FileError::NotFound {
        file_id,
    })
    .await?;
    Ok(([(header::CONTENT_TYPE, document.content_type)], document.data))
}

/// Replace the content of a file
///
/// Last write wins: concurrent writers are not detected, the latest PUT is
/// what everybody reads afterwards.
#[utoipa::path(
    put, path = "/projects/{project_id}/files/{file_id}/content",
    tag = "files",
    params(FileIdParams),
    request_body = String,
    responses(
        (status = 200, body = FileNode, description = "The updated node"),
        (status = 400, description = "The node is a directory"),
    )
)]
pub(in crate::views) async fn put_content(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path((project_id, file_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<FileNode>> {
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_editable(&mut conn, &project, &auth).await?;
    let node = retrieve_project_file(conn.clone(), project_id, file_id).await?;
    let document_key = node.document.ok_or(FileError::NotAFile { file_id })?;

    let mut document = Document::changeset().data(body.to_vec());
    if let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    {
        document = document.content_type(content_type.to_owned());
    }

    let node = conn
        .transaction(|mut conn| {
            async move {
                document
                    .update_or_fail(&mut conn, document_key, || FileError::NotFound { file_id })
                    .await?;
                FileNode::changeset()
                    .last_modification(Utc::now())
                    .update_or_fail(&mut conn, file_id, || FileError::NotFound { file_id })
                    .await
            }
            .scope_boxed()
        })
        .await?;
    Ok(Json(node))
}

/// Patch form for a file tree node
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub(in crate::views) struct FilePatchForm {
    /// The new path of the node
    #[schema(max_length = 4096)]
    pub path: String,
}

/// Rename or move a node; directories move with their subtree
#[utoipa::path(
    patch, path = "/projects/{project_id}/files/{file_id}",
    tag = "files",
    params(FileIdParams),
    request_body = FilePatchForm,
    responses(
        (status = 200, body = FileNode, description = "The updated node"),
        (status = 400, description = "Duplicate or invalid path"),
    )
)]
pub(in crate::views) async fn patch(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path((project_id, file_id)): Path<(i64, i64)>,
    Json(form): Json<FilePatchForm>,
) -> Result<Json<FileNode>> {
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_editable(&mut conn, &project, &auth).await?;
    check_path(&form.path)?;
    let node = retrieve_project_file(conn.clone(), project_id, file_id).await?;

    let old_path = node.path.clone();
    let new_path = form.path.clone();
    let is_directory = node.kind == FileKind::Directory;

    fn map_collision(path: String) -> impl FnOnce(atelier_models::Error) -> FileError {
        move |e| match e {
            atelier_models::Error::UniqueViolation { .. } => FileError::DuplicatePath { path },
            e => FileError::Database(e),
        }
    }

    // a collision anywhere in the subtree rolls the whole move back
    let node = conn
        .transaction(|mut conn| {
            async move {
                let node = FileNode::changeset()
                    .path(new_path.clone())
                    .last_modification(Utc::now())
                    .update(&mut conn, file_id)
                    .await
                    .map_err(map_collision(new_path.clone()))?
                    .ok_or(FileError::NotFound { file_id })?;
                if is_directory {
                    let old_prefix = format!("{old_path}/");
                    let children = FileNode::list(
                        &mut conn,
                        SelectionSettings::new()
                            .filter(move || file_node::project_id.eq(project_id))
                            .filter({
                                let like = format!("{old_path}/%");
                                move || file_node::path.like(like.clone())
                            }),
                    )
                    .await
                    .map_err(FileError::Database)?;
                    for child in children {
                        let moved = format!(
                            "{new_path}/{}",
                            child
                                .path
                                .strip_prefix(&old_prefix)
                                .expect("children are selected by prefix")
                        );
                        FileNode::changeset()
                            .path(moved.clone())
                            .last_modification(Utc::now())
                            .update(&mut conn, child.id)
                            .await
                            .map_err(map_collision(moved))?
                            .ok_or(FileError::NotFound { file_id: child.id })?;
                    }
                }
                Ok::<_, FileError>(node)
            }
            .scope_boxed()
        })
        .await?;
    Ok(Json(node))
}

/// Delete a node; deleting a directory deletes its subtree
#[utoipa::path(
    delete, path = "/projects/{project_id}/files/{file_id}",
    tag = "files",
    params(FileIdParams),
    responses(
        (status = 204, description = "The node was deleted"),
    )
)]
pub(in crate::views) async fn delete(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path((project_id, file_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse> {
    let mut conn = db_pool.get().await?;
    let project = Project::retrieve_or_fail(conn.clone(), project_id, || ProjectError::NotFound {
        project_id,
    })
    .await?;
    check_project_editable(&mut conn, &project, &auth).await?;
    let node = retrieve_project_file(conn.clone(), project_id, file_id).await?;

    node.delete_subtree(&mut conn)
        .await
        .map_err(FileError::Database)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
pub mod tests {
    use super::*;

    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::models::fixtures::create_directory;
    use crate::models::fixtures::create_file;
    use crate::models::fixtures::create_project;
    use crate::views::test_app::TestAppBuilder;
    use crate::views::test_app::TestRequestExt;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn file_creation_with_content() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "proj").await;

        let request = app
            .post(format!("/projects/{}/files", project.id).as_str())
            .by_user(&alice)
            .json(&json!({
                "path": "src/main.rs",
                "kind": "file",
                "content": "fn main() {}",
            }));
        let node: FileNode = app
            .fetch(request)
            .await
            .assert_status(StatusCode::CREATED)
            .json_into();
        assert_eq!(node.path, "src/main.rs");

        let request = app
            .get(format!("/projects/{}/files/{}/content", project.id, node.id).as_str())
            .by_user(&alice);
        let response = app.fetch(request).await.assert_status(StatusCode::OK);
        assert_eq!(response.bytes(), b"fn main() {}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn duplicate_path_is_a_400() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "proj").await;
        let _existing = create_file(&mut db_pool.get_ok(), project.id, "src/main.rs", "").await;

        let request = app
            .post(format!("/projects/{}/files", project.id).as_str())
            .by_user(&alice)
            .json(&json!({ "path": "src/main.rs", "kind": "file" }));
        app.fetch(request)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[rstest::rstest]
    #[case("/absolute")]
    #[case("trailing/")]
    #[case("a//b")]
    #[case("a/../b")]
    #[case("a/./b")]
    #[case("")]
    fn weird_paths_are_rejected(#[case] path: &str) {
        assert!(check_path(path).is_err());
    }

    #[rstest::rstest]
    #[case("README.md")]
    #[case("src/main.rs")]
    #[case("deeply/nested/dir/file.txt")]
    fn sane_paths_are_accepted(#[case] path: &str) {
        assert!(check_path(path).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn weird_paths_are_a_400() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "proj").await;

        let request = app
            .post(format!("/projects/{}/files", project.id).as_str())
            .by_user(&alice)
            .json(&json!({ "path": "../escape", "kind": "file" }));
        app.fetch(request)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn content_replacement_wins_last() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "proj").await;
        let file = create_file(&mut db_pool.get_ok(), project.id, "notes.md", "first").await;

        for content in ["second", "third"] {
            let request = app
                .put(format!("/projects/{}/files/{}/content", project.id, file.id).as_str())
                .by_user(&alice)
                .bytes(content.as_bytes().to_vec().into());
            app.fetch(request).await.assert_status(StatusCode::OK);
        }

        let request = app
            .get(format!("/projects/{}/files/{}/content", project.id, file.id).as_str())
            .by_user(&alice);
        let response = app.fetch(request).await.assert_status(StatusCode::OK);
        assert_eq!(response.bytes(), b"third");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn directory_rename_moves_the_subtree() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "proj").await;
        let dir = create_directory(&mut db_pool.get_ok(), project.id, "src").await;
        let _child = create_file(&mut db_pool.get_ok(), project.id, "src/main.rs", "").await;

        let request = app
            .patch(format!("/projects/{}/files/{}", project.id, dir.id).as_str())
            .by_user(&alice)
            .json(&json!({ "path": "lib" }));
        app.fetch(request).await.assert_status(StatusCode::OK);

        let moved = FileNode::find_by_path(&mut db_pool.get_ok(), project.id, "lib/main.rs")
            .await
            .unwrap();
        assert!(moved.is_some(), "children should move with their directory");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn directory_content_is_a_400() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "proj").await;
        let dir = create_directory(&mut db_pool.get_ok(), project.id, "src").await;

        let request = app
            .get(format!("/projects/{}/files/{}/content", project.id, dir.id).as_str())
            .by_user(&alice);
        app.fetch(request)
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn viewers_cannot_edit() {
        let app = TestAppBuilder::default_app();
        let db_pool = app.db_pool();
        let alice = app.user("alice").create().await;
        let bob = app.user("bob").create().await;
        let project = create_project(&mut db_pool.get_ok(), alice.user.id, "proj").await;
        crate::models::ProjectCollaborator::changeset()
            .project(project.id)
            .user(bob.user.id)
            .role(crate::models::CollaboratorRole::Viewer)
            .creation_date(Utc::now())
            .create(&mut db_pool.get_ok())
            .await
            .unwrap();

        let request = app
            .post(format!("/projects/{}/files", project.id).as_str())
            .by_user(&bob)
            .json(&json!({ "path": "hack.rs", "kind": "file" }));
        app.fetch(request).await.assert_status(StatusCode::FORBIDDEN);
    }
}
