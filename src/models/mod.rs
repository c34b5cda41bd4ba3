pub mod file_node;
#[cfg(test)]
pub mod fixtures;
pub mod friendship;
pub mod project;
pub mod project_collaborator;
pub mod project_rating;
pub mod user;

pub use file_node::FileKind;
pub use file_node::FileNode;
pub use friendship::Friendship;
pub use friendship::FriendshipStatus;
pub use project::Project;
pub use project_collaborator::CollaboratorRole;
pub use project_collaborator::ProjectCollaborator;
pub use project_rating::ProjectRating;
pub use project_rating::RatingSummary;
pub use user::Role;
pub use user::User;

use atelier_models::Document;
use atelier_models::prelude::*;
use database::DbConnection;
use diesel_async::scoped_futures::ScopedFutureExt as _;

/// Deletes a document unless something still references it
///
/// Avatars and project images may share a document. The FK violation raised
/// by a still-referenced document is not an error here, it just means the
/// blob has to stay. The transaction confines the rollback to this deletion.
#[tracing::instrument(skip(conn), ret, err)]
pub(crate) async fn try_delete_document(
    conn: &DbConnection,
    doc_id: i64,
) -> Result<(), atelier_models::Error> {
    let res = conn
        .transaction(|mut conn| {
            async move {
                match Document::delete_static(&mut conn, doc_id).await {
                    Ok(false) => unreachable!(
                        "cannot happen as the document has to be there because of the FK on the referencing row"
                    ),
                    Ok(true) => Ok(()),
                    Err(e) => Err(e),
                }
            }
            .scope_boxed()
        })
        .await;
    match res {
        Ok(_) => Ok(()),
        Err(atelier_models::Error::ForeignKeyViolation { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}
