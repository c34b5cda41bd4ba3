use std::ops::DerefMut;

use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::file_node;
use database::tables::project;
use database::tables::project_collaborator;
use diesel::dsl::exists;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt;
use serde::Deserialize;
use serde::Serialize;
use utoipa::ToSchema;

use atelier_models::Document;
use atelier_models::Tags;
use atelier_models::prelude::*;
// an explicit import outranks the globs, `diesel::prelude` has its own Identifiable
use atelier_models::prelude::Identifiable;

use crate::models::CollaboratorRole;
use crate::models::FileNode;
use crate::models::ProjectCollaborator;
use crate::models::try_delete_document;

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct Project {
    pub id: i64,
    pub owner: i64,
    pub name: String,
    pub description: Option<String>,
    pub public: bool,
    pub tags: Tags,
    /// The id of the image document
    pub image: Option<i64>,
    pub forked_from: Option<i64>,
    pub view_count: i64,
    pub creation_date: DateTime<Utc>,
    pub last_modification: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = project)]
pub struct ProjectRow {
    id: i64,
    owner_id: i64,
    name: String,
    description: Option<String>,
    public: bool,
    tags: Vec<Option<String>>,
    image_id: Option<i64>,
    forked_from: Option<i64>,
    view_count: i64,
    creation_date: DateTime<Utc>,
    last_modification: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            owner: row.owner_id,
            name: row.name,
            description: row.description,
            public: row.public,
            tags: row.tags.into(),
            image: row.image_id,
            forked_from: row.forked_from,
            view_count: row.view_count,
            creation_date: row.creation_date,
            last_modification: row.last_modification,
        }
    }
}

#[derive(Debug, Default, Clone, Insertable, AsChangeset)]
#[diesel(table_name = project)]
pub struct ProjectChangeset {
    pub owner_id: Option<i64>,
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub public: Option<bool>,
    pub tags: Option<Vec<Option<String>>>,
    pub image_id: Option<Option<i64>>,
    pub forked_from: Option<Option<i64>>,
    pub creation_date: Option<DateTime<Utc>>,
    pub last_modification: Option<DateTime<Utc>>,
}

impl ProjectChangeset {
    pub fn owner(mut self, owner: i64) -> Self {
        self.owner_id = Some(owner);
        self
    }

    pub fn name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn flat_name(mut self, name: Option<String>) -> Self {
        if let Some(name) = name {
            self.name = Some(name);
        }
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = Some(description);
        self
    }

    pub fn flat_description(mut self, description: Option<Option<String>>) -> Self {
        if let Some(description) = description {
            self.description = Some(description);
        }
        self
    }

    pub fn public(mut self, public: bool) -> Self {
        self.public = Some(public);
        self
    }

    pub fn flat_public(mut self, public: Option<bool>) -> Self {
        if let Some(public) = public {
            self.public = Some(public);
        }
        self
    }

    pub fn tags(mut self, tags: Tags) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn flat_tags(mut self, tags: Option<Tags>) -> Self {
        if let Some(tags) = tags {
            self.tags = Some(tags.into());
        }
        self
    }

    pub fn image(mut self, image: Option<i64>) -> Self {
        self.image_id = Some(image);
        self
    }

    pub fn flat_image(mut self, image: Option<Option<i64>>) -> Self {
        if let Some(image) = image {
            self.image_id = Some(image);
        }
        self
    }

    pub fn forked_from(mut self, forked_from: Option<i64>) -> Self {
        self.forked_from = Some(forked_from);
        self
    }

    pub fn creation_date(mut self, creation_date: DateTime<Utc>) -> Self {
        self.creation_date = Some(creation_date);
        self
    }

    pub fn last_modification(mut self, last_modification: DateTime<Utc>) -> Self {
        self.last_modification = Some(last_modification);
        self
    }
}

impl From<Project> for ProjectChangeset {
    fn from(project: Project) -> Self {
        Self {
            owner_id: Some(project.owner),
            name: Some(project.name),
            description: Some(project.description),
            public: Some(project.public),
            tags: Some(project.tags.into()),
            image_id: Some(project.image),
            forked_from: Some(project.forked_from),
            creation_date: Some(project.creation_date),
            last_modification: Some(project.last_modification),
        }
    }
}

impl Model for Project {
    type Row = ProjectRow;
    type Changeset = ProjectChangeset;
    type Table = project::table;
}

impl Identifiable for Project {
    fn get_id(&self) -> i64 {
        self.id
    }
}

impl PreferredId<i64> for Project {}

impl Create<Project> for ProjectChangeset {
    type Error = atelier_models::Error;

    async fn create(self, conn: &mut DbConnection) -> Result<Project, Self::Error> {
        let row: ProjectRow = diesel::insert_into(project::table)
            .values(&self)
            .returning(ProjectRow::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(Project::from_row(row))
    }
}

impl Retrieve<i64> for Project {
    type Error = atelier_models::Error;

    async fn retrieve(conn: DbConnection, project_id: i64) -> Result<Option<Self>, Self::Error> {
        let row = project::table
            .find(project_id)
            .select(ProjectRow::as_select())
            .first::<ProjectRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(Project::from_row))
    }
}

impl Exists<i64> for Project {
    type Error = atelier_models::Error;

    async fn exists(conn: &mut DbConnection, project_id: i64) -> Result<bool, Self::Error> {
        diesel::select(exists(project::table.find(project_id)))
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)
    }
}

impl Update<i64, Project> for ProjectChangeset {
    type Error = atelier_models::Error;

    async fn update(
        self,
        conn: &mut DbConnection,
        project_id: i64,
    ) -> Result<Option<Project>, Self::Error> {
        let row = diesel::update(project::table.find(project_id))
            .set(&self)
            .returning(ProjectRow::as_returning())
            .get_result::<ProjectRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(Project::from_row))
    }
}

impl Delete for Project {
    type Error = atelier_models::Error;

    async fn delete(&self, conn: &mut DbConnection) -> Result<bool, Self::Error> {
        diesel::delete(project::table.find(self.id))
            .execute(conn.write().await.deref_mut())
            .await
            .map(|deleted| deleted > 0)
            .map_err(atelier_models::Error::from)
    }
}

impl List for Project {
    type Error = atelier_models::Error;

    async fn list(
        conn: &mut DbConnection,
        settings: SelectionSettings<Self>,
    ) -> Result<Vec<Self>, Self::Error> {
        let mut query = project::table.select(ProjectRow::as_select()).into_boxed();
        for filter in &settings.filters {
            query = query.filter(filter());
        }
        for order in &settings.order_by {
            query = query.then_order_by(order());
        }
        if let Some(limit) = settings.limit {
            query = query.limit(limit as i64);
        }
        if let Some(offset) = settings.offset {
            query = query.offset(offset as i64);
        }
        let rows = query
            .load::<ProjectRow>(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(rows.into_iter().map(Project::from_row).collect())
    }
}

impl Count for Project {
    type Error = atelier_models::Error;

    async fn count(
        conn: &mut DbConnection,
        settings: SelectionSettings<Self>,
    ) -> Result<u64, Self::Error> {
        let mut query = project::table.into_boxed();
        for filter in &settings.filters {
            query = query.filter(filter());
        }
        let count: i64 = query
            .count()
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(count as u64)
    }
}

impl Project {
    /// Restricts a selection to the projects the viewer is allowed to see:
    /// public ones, their own, and the ones they collaborate on
    pub fn visibility_settings(
        settings: SelectionSettings<Self>,
        viewer: Option<i64>,
    ) -> SelectionSettings<Self> {
        match viewer {
            Some(viewer) => settings.filter(move || {
                let collaboration = project_collaborator::table
                    .filter(project_collaborator::project_id.eq(project::id))
                    .filter(project_collaborator::user_id.eq(viewer));
                project::public
                    .eq(true)
                    .or(project::owner_id.eq(viewer))
                    .or(exists(collaboration))
            }),
            None => settings.filter(|| project::public.eq(true)),
        }
    }

    pub async fn files_count(&self, conn: &mut DbConnection) -> Result<u64, atelier_models::Error> {
        let project_id = self.id;
        FileNode::count(
            conn,
            SelectionSettings::new().filter(move || file_node::project_id.eq(project_id)),
        )
        .await
    }

    /// Atomically bumps the view counter and returns the updated project
    ///
    /// A single SQL increment, so concurrent reads never lose a view.
    pub async fn increment_view_count(
        conn: &mut DbConnection,
        project_id: i64,
    ) -> Result<Option<Project>, atelier_models::Error> {
        let row = diesel::update(project::table.find(project_id))
            .set(project::view_count.eq(project::view_count + 1))
            .returning(ProjectRow::as_returning())
            .get_result::<ProjectRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(Project::from_row))
    }

    pub async fn is_visible_to(
        &self,
        conn: &mut DbConnection,
        viewer: Option<i64>,
    ) -> Result<bool, atelier_models::Error> {
        if self.public {
            return Ok(true);
        }
        let Some(viewer) = viewer else {
            return Ok(false);
        };
        if self.owner == viewer {
            return Ok(true);
        }
        ProjectCollaborator::role_of(conn, self.id, viewer)
            .await
            .map(|role| role.is_some())
    }

    pub async fn editable_by(
        &self,
        conn: &mut DbConnection,
        user_id: i64,
    ) -> Result<bool, atelier_models::Error> {
        if self.owner == user_id {
            return Ok(true);
        }
        ProjectCollaborator::role_of(conn, self.id, user_id)
            .await
            .map(|role| matches!(role, Some(CollaboratorRole::Editor)))
    }

    /// Updates a project's image and deletes the old one if it is not referenced anymore
    #[tracing::instrument(skip(conn), ret, err)]
    pub async fn update_and_prune_image(
        &mut self,
        conn: &mut DbConnection,
        new_doc_id: Option<i64>,
    ) -> Result<(), atelier_models::Error> {
        conn.transaction(|mut conn| {
            async move {
                let old_doc_id = self.image;
                self.image = new_doc_id;
                self.save(&mut conn).await?;
                if new_doc_id != old_doc_id
                    && let Some(old_doc_id) = old_doc_id
                {
                    try_delete_document(&conn, old_doc_id).await?;
                }
                Ok::<_, atelier_models::Error>(())
            }
            .scope_boxed()
        })
        .await?;
        Ok(())
    }

    /// Deletes a project, its files and their contents, and prunes the image
    /// if it is not referenced anymore
    #[tracing::instrument(skip(conn), ret, err)]
    pub async fn delete_and_prune_documents(
        self,
        conn: &mut DbConnection,
    ) -> Result<(), atelier_models::Error> {
        conn.transaction(|mut conn| {
            async move {
                let content_keys = FileNode::content_keys(&mut conn, self.id).await?;
                if !self.delete(&mut conn).await? {
                    tracing::warn!(
                        project_id = self.id,
                        "project to delete not found, probable race condition"
                    );
                }
                // file rows are gone through the FK cascade, their contents are not
                for document_key in content_keys {
                    Document::delete_static(&mut conn, document_key).await?;
                }
                if let Some(doc_id) = self.image {
                    try_delete_document(&conn, doc_id).await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
    }

    /// Copies the project, its file tree and the file contents in a single
    /// transaction and returns the copy
    ///
    /// The fork starts private, keeps a reference to its origin and shares the
    /// project image document (pruning is reference-aware).
    #[tracing::instrument(skip(conn, self), fields(project_id = self.id), err)]
    pub async fn fork(
        self,
        conn: &mut DbConnection,
        new_owner: i64,
        name: Option<String>,
    ) -> Result<Project, atelier_models::Error> {
        conn.transaction(|mut conn| {
            async move {
                let now = Utc::now();
                let fork = Project::changeset()
                    .owner(new_owner)
                    .name(name.unwrap_or_else(|| self.name.clone()))
                    .description(self.description.clone())
                    .public(false)
                    .tags(self.tags.clone())
                    .image(self.image)
                    .forked_from(Some(self.id))
                    .creation_date(now)
                    .last_modification(now)
                    .create(&mut conn)
                    .await?;

                let project_id = self.id;
                let nodes = FileNode::list(
                    &mut conn,
                    SelectionSettings::new()
                        .filter(move || file_node::project_id.eq(project_id)),
                )
                .await?;
                for node in nodes {
                    let content = match node.document {
                        Some(document_key) => {
                            let document =
                                Document::retrieve(conn.clone(), document_key)
                                    .await?
                                    .expect("file contents are deleted with their nodes");
                            let copy = Document::changeset()
                                .content_type(document.content_type)
                                .data(document.data)
                                .create(&mut conn)
                                .await?;
                            Some(copy.id)
                        }
                        None => None,
                    };
                    FileNode::changeset()
                        .project(fork.id)
                        .path(node.path)
                        .kind(node.kind)
                        .document(content)
                        .creation_date(now)
                        .last_modification(now)
                        .create(&mut conn)
                        .await?;
                }

                Ok(fork)
            }
            .scope_boxed()
        })
        .await
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    use database::DbConnectionPoolV2;
    use pretty_assertions::assert_eq;

    use crate::models::fixtures::create_file;
    use crate::models::fixtures::create_project;
    use crate::models::fixtures::create_user;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn project_creation() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let project = create_project(&mut db_pool.get_ok(), owner.id, "test_project").await;
        assert_eq!(project.name, "test_project");
        assert_eq!(project.owner, owner.id);
        assert_eq!(project.view_count, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn project_retrieve() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let created = create_project(&mut db_pool.get_ok(), owner.id, "test_project").await;

        let project = Project::retrieve(db_pool.get_ok(), created.id)
            .await
            .expect("Failed to retrieve project")
            .expect("Project not found");

        assert_eq!(&created, &project);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn view_count_increments_atomically() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let project = create_project(&mut db_pool.get_ok(), owner.id, "test_project").await;

        for _ in 0..3 {
            Project::increment_view_count(&mut db_pool.get_ok(), project.id)
                .await
                .expect("Failed to increment view count")
                .expect("Project not found");
        }

        let project = Project::retrieve(db_pool.get_ok(), project.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(project.view_count, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn fork_copies_files_and_contents() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let other = create_user(&mut db_pool.get_ok(), "other").await;
        let project = create_project(&mut db_pool.get_ok(), owner.id, "test_project").await;
        let file = create_file(
            &mut db_pool.get_ok(),
            project.id,
            "src/main.rs",
            "fn main() {}",
        )
        .await;

        let fork = project
            .clone()
            .fork(&mut db_pool.get_ok(), other.id, None)
            .await
            .expect("Failed to fork project");

        assert_eq!(fork.owner, other.id);
        assert_eq!(fork.forked_from, Some(project.id));
        assert!(!fork.public);

        let copied = FileNode::find_by_path(&mut db_pool.get_ok(), fork.id, "src/main.rs")
            .await
            .expect("Failed to look up copied file")
            .expect("Fork should contain the copied file");
        // contents are copied, not shared
        assert_ne!(copied.document, file.document);
        let content = Document::retrieve(db_pool.get_ok(), copied.document.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(content.data, b"fn main() {}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn delete_prunes_file_contents() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let project = create_project(&mut db_pool.get_ok(), owner.id, "test_project").await;
        let file = create_file(&mut db_pool.get_ok(), project.id, "notes.md", "hello").await;
        let document_key = file.document.unwrap();

        project
            .delete_and_prune_documents(&mut db_pool.get_ok())
            .await
            .expect("Failed to delete project");

        assert!(
            !Document::exists(&mut db_pool.get_ok(), document_key)
                .await
                .unwrap(),
            "file contents should be deleted with the project"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn visibility() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let stranger = create_user(&mut db_pool.get_ok(), "stranger").await;
        let project = create_project(&mut db_pool.get_ok(), owner.id, "private_project").await;

        assert!(
            project
                .is_visible_to(&mut db_pool.get_ok(), Some(owner.id))
                .await
                .unwrap()
        );
        assert!(
            !project
                .is_visible_to(&mut db_pool.get_ok(), Some(stranger.id))
                .await
                .unwrap()
        );
        assert!(
            !project
                .is_visible_to(&mut db_pool.get_ok(), None)
                .await
                .unwrap()
        );
    }
}
