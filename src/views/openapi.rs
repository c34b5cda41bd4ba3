use utoipa::OpenApi;

use crate::error::InternalError;
use crate::models::CollaboratorRole;
use crate::models::FileKind;
use crate::models::FileNode;
use crate::models::Friendship;
use crate::models::FriendshipStatus;
use crate::models::Project;
use crate::models::ProjectRating;
use crate::models::RatingSummary;
use crate::models::Role;

/// The OpenAPI description of the whole service
///
/// Printed by the `openapi` CLI command; handler annotations are collected
/// here, schemas referenced from the annotations are collected transitively.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "atelier",
        description = "Collaborative code editing platform backend",
    ),
    paths(
        super::health,
        super::version,
        super::relay::websocket,
        super::auth::signup,
        super::auth::login,
        super::users::list,
        super::users::me,
        super::users::patch,
        super::users::get,
        super::users::delete,
        super::project::create,
        super::project::list,
        super::project::get,
        super::project::patch,
        super::project::delete,
        super::project::fork,
        super::project::collaborators::list,
        super::project::collaborators::add,
        super::project::collaborators::remove,
        super::project::ratings::list,
        super::project::ratings::rate,
        super::files::create,
        super::files::list,
        super::files::get,
        super::files::get_content,
        super::files::put_content,
        super::files::patch,
        super::files::delete,
        super::documents::post,
        super::documents::get,
        super::documents::delete,
        super::friends::list,
        super::friends::pending,
        super::friends::request,
        super::friends::accept,
        super::friends::remove,
        super::assist::complete,
        super::assist::explain,
        super::assist::execute,
    ),
    components(schemas(
        InternalError,
        Project,
        FileNode,
        FileKind,
        Friendship,
        FriendshipStatus,
        CollaboratorRole,
        ProjectRating,
        RatingSummary,
        Role,
        common::Version,
        atelier_models::Tags,
        super::users::UserProfile,
        super::users::CurrentUserProfile,
        super::users::UserPatchForm,
        super::auth::SignupForm,
        super::auth::LoginForm,
        super::auth::TokenResponse,
        super::pagination::PaginationStats,
        super::project::ProjectCreateForm,
        super::project::ProjectPatchForm,
        super::project::ProjectWithFileCount,
        super::project::ForkForm,
        super::project::collaborators::Collaborator,
        super::project::collaborators::CollaboratorForm,
        super::project::ratings::RatingForm,
        super::files::FileCreateForm,
        super::files::FilePatchForm,
        super::friends::FriendEntry,
        super::friends::FriendRequest,
        super::friends::FriendRequestForm,
        super::assist::AnswerSource,
        super::assist::CompletionForm,
        super::assist::CompletionAnswer,
        super::assist::ExplanationForm,
        super::assist::ExplanationAnswer,
        super::assist::ExecutionForm,
        super::assist::ExecutionOutput,
    )),
    tags(
        (name = "auth", description = "Accounts and tokens"),
        (name = "users", description = "Profiles"),
        (name = "projects", description = "Projects, collaborators and ratings"),
        (name = "files", description = "The virtual file tree and its contents"),
        (name = "documents", description = "Binary payload storage"),
        (name = "friends", description = "Friend edges"),
        (name = "assist", description = "AI-assisted editing helpers"),
        (name = "relay", description = "Realtime collaboration relay"),
    )
)]
pub struct OpenApiRoot;

impl OpenApiRoot {
    pub fn build_openapi() -> utoipa::openapi::OpenApi {
        <Self as OpenApi>::openapi()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_builds_and_covers_the_surface() {
        let openapi = OpenApiRoot::build_openapi();
        let paths = &openapi.paths.paths;
        for expected in [
            "/health",
            "/auth/login",
            "/projects",
            "/projects/{project_id}/files/{file_id}/content",
            "/assist/execute",
            "/ws",
        ] {
            assert!(paths.contains_key(expected), "missing path {expected}");
        }
    }
}
