use axum::Extension;
use axum::body::Bytes;
use axum::extract::Json;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header;
use axum::response::IntoResponse;
use database::DbConnection;
use database::DbConnectionPoolV2;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use utoipa::IntoParams;
use utoipa::ToSchema;

use atelier_derive::AtelierError;
use atelier_models::Document;
use atelier_models::prelude::*;

use super::AuthenticationExt;
use super::AuthorizationError;
use crate::error::Result;
use crate::models::Role;

#[derive(Debug, Error, AtelierError)]
#[atelier_error(base_id = "document")]
pub enum DocumentError {
    #[error("Document '{document_key}' not found")]
    #[atelier_error(status = 404)]
    NotFound { document_key: i64 },
    #[error("Image document '{document_key}' not found")]
    #[atelier_error(status = 404)]
    ImageNotFound { document_key: i64 },
    #[error("The provided image is not valid: {error}")]
    #[atelier_error(status = 400)]
    InvalidImage { error: String },
    #[error(transparent)]
    #[atelier_error(status = 500)]
    Database(#[from] atelier_models::Error),
}

/// Checks that a document key points to a decodable image
///
/// Used before attaching a document as an avatar or a project image.
pub(in crate::views) async fn check_image_content(
    conn: &mut DbConnection,
    document_key: i64,
) -> Result<()> {
    let doc = Document::retrieve_or_fail(conn.clone(), document_key, || {
        DocumentError::ImageNotFound { document_key }
    })
    .await?;

    if let Err(e) = image::load_from_memory(&doc.data) {
        return Err(DocumentError::InvalidImage {
            error: e.to_string(),
        }
        .into());
    }
    Ok(())
}

#[derive(Debug, Serialize, ToSchema)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub(in crate::views) struct NewDocumentResponse {
    pub document_key: i64,
}

/// Store a binary payload
///
/// The raw request body is stored verbatim with its `Content-Type`.
#[utoipa::path(
    post, path = "/documents",
    tag = "documents",
    request_body = Vec<u8>,
    responses(
        (status = 201, body = inline(NewDocumentResponse), description = "The key of the stored document"),
    )
)]
pub(in crate::views) async fn post(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let authorized = auth.check_roles([Role::User].into()).await?;
    if !authorized {
        return Err(AuthorizationError::Forbidden.into());
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(mime::APPLICATION_OCTET_STREAM.as_ref());

    let conn = &mut db_pool.get().await?;
    let document = Document::changeset()
        .content_type(content_type.to_owned())
        .data(body.to_vec())
        .create(conn)
        .await
        .map_err(DocumentError::Database)?;

    Ok((
        StatusCode::CREATED,
        Json(NewDocumentResponse {
            document_key: document.id,
        }),
    ))
}

// Documentation struct
#[derive(IntoParams)]
#[allow(unused)]
pub struct DocumentKeyParam {
    /// The key of a stored document
    document_key: i64,
}

/// Retrieve a stored payload with its original content type
#[utoipa::path(
    get, path = "/documents/{document_key}",
    tag = "documents",
    params(DocumentKeyParam),
    responses(
        (status = 200, body = Vec<u8>, description = "The stored payload"),
        (status = 404, description = "No document with this key"),
    )
)]
pub(in crate::views) async fn get(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(document_key): Path<i64>,
) -> Result<impl IntoResponse> {
    let authorized = auth.check_roles([Role::User].into()).await?;
    if !authorized {
        return Err(AuthorizationError::Forbidden.into());
    }
    let conn = db_pool.get().await?;
    let document = Document::retrieve_or_fail(conn, document_key, || DocumentError::NotFound {
        document_key,
    })
    .await?;

    Ok((
        [(header::CONTENT_TYPE, document.content_type)],
        document.data,
    ))
}

/// Delete a stored payload
#[utoipa::path(
    delete, path = "/documents/{document_key}",
    tag = "documents",
    params(DocumentKeyParam),
    responses(
        (status = 204, description = "The document was deleted"),
        (status = 404, description = "No document with this key"),
    )
)]
pub(in crate::views) async fn delete(
    State(db_pool): State<Arc<DbConnectionPoolV2>>,
    Extension(auth): AuthenticationExt,
    Path(document_key): Path<i64>,
) -> Result<impl IntoResponse> {
    let authorized = auth.check_roles([Role::User].into()).await?;
    if !authorized {
        return Err(AuthorizationError::Forbidden.into());
    }
    let conn = &mut db_pool.get().await?;
    Document::delete_static_or_fail(conn, document_key, || DocumentError::NotFound {
        document_key,
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::StatusCode;
    use pretty_assertions::assert_eq;

    use crate::views::test_app::TestAppBuilder;
    use crate::views::test_app::TestRequestExt;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn document_round_trip() {
        let app = TestAppBuilder::default_app();
        let alice = app.user("alice").create().await;

        let request = app
            .post("/documents")
            .by_user(&alice)
            .add_header("Content-Type", "text/markdown")
            .bytes("# Notes".as_bytes().to_vec().into());
        let created: NewDocumentResponse = app
            .fetch(request)
            .await
            .assert_status(StatusCode::CREATED)
            .json_into();

        let request = app
            .get(format!("/documents/{}", created.document_key).as_str())
            .by_user(&alice);
        let response = app.fetch(request).await.assert_status(StatusCode::OK);
        assert_eq!(response.content_type(), "text/markdown");
        assert_eq!(response.bytes(), b"# Notes");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn deleted_documents_are_gone() {
        let app = TestAppBuilder::default_app();
        let alice = app.user("alice").create().await;

        let request = app
            .post("/documents")
            .by_user(&alice)
            .bytes(b"payload".to_vec().into());
        let created: NewDocumentResponse = app
            .fetch(request)
            .await
            .assert_status(StatusCode::CREATED)
            .json_into();

        let request = app
            .delete(format!("/documents/{}", created.document_key).as_str())
            .by_user(&alice);
        app.fetch(request)
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let request = app
            .get(format!("/documents/{}", created.document_key).as_str())
            .by_user(&alice);
        app.fetch(request).await.assert_status(StatusCode::NOT_FOUND);
    }
}
