use chrono::Utc;
use database::DbConnection;

use atelier_models::Document;
use atelier_models::prelude::*;

use crate::models::FileKind;
use crate::models::FileNode;
use crate::models::Project;
use crate::models::Role;
use crate::models::User;
use crate::views::auth::hash_password;

/// Every fixture user logs in with this password
pub const FIXTURE_PASSWORD: &str = "correct horse battery staple";

pub async fn create_user(conn: &mut DbConnection, username: &str) -> User {
    create_user_with_role(conn, username, Role::User).await
}

pub async fn create_admin(conn: &mut DbConnection, username: &str) -> User {
    create_user_with_role(conn, username, Role::Admin).await
}

pub async fn create_user_with_role(conn: &mut DbConnection, username: &str, role: Role) -> User {
    User::changeset()
        .username(username.to_owned())
        .email(format!("{username}@example.net"))
        .password_hash(hash_password(FIXTURE_PASSWORD).expect("Failed to hash fixture password"))
        .display_name(Some(username.to_owned()))
        .role(role)
        .creation_date(Utc::now())
        .create(conn)
        .await
        .expect("Failed to create user fixture")
}

pub async fn create_project(conn: &mut DbConnection, owner: i64, name: &str) -> Project {
    Project::changeset()
        .owner(owner)
        .name(name.to_owned())
        .description(None)
        .public(false)
        .creation_date(Utc::now())
        .last_modification(Utc::now())
        .create(conn)
        .await
        .expect("Failed to create project fixture")
}

pub async fn create_public_project(conn: &mut DbConnection, owner: i64, name: &str) -> Project {
    Project::changeset()
        .owner(owner)
        .name(name.to_owned())
        .description(None)
        .public(true)
        .creation_date(Utc::now())
        .last_modification(Utc::now())
        .create(conn)
        .await
        .expect("Failed to create project fixture")
}

pub async fn create_file(
    conn: &mut DbConnection,
    project: i64,
    path: &str,
    contents: &str,
) -> FileNode {
    let document = Document::changeset()
        .content_type("text/plain".to_owned())
        .data(contents.as_bytes().to_vec())
        .create(conn)
        .await
        .expect("Failed to create content fixture");
    FileNode::changeset()
        .project(project)
        .path(path.to_owned())
        .kind(FileKind::File)
        .document(Some(document.id))
        .creation_date(Utc::now())
        .last_modification(Utc::now())
        .create(conn)
        .await
        .expect("Failed to create file fixture")
}

pub async fn create_directory(conn: &mut DbConnection, project: i64, path: &str) -> FileNode {
    FileNode::changeset()
        .project(project)
        .path(path.to_owned())
        .kind(FileKind::Directory)
        .document(None)
        .creation_date(Utc::now())
        .last_modification(Utc::now())
        .create(conn)
        .await
        .expect("Failed to create directory fixture")
}
