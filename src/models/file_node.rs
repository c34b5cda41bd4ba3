use std::ops::DerefMut;

use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::file_node;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt;
use serde::Deserialize;
use serde::Serialize;
use utoipa::ToSchema;

use atelier_models::Document;
use atelier_models::prelude::*;
// an explicit import outranks the globs, `diesel::prelude` has its own Identifiable
use atelier_models::prelude::Identifiable;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
}

/// A node of a project's virtual file tree
///
/// The text payload of a file lives in a separate document row, referenced by
/// key. Directories carry no document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileNode {
    pub id: i64,
    pub project: i64,
    pub path: String,
    pub kind: FileKind,
    /// The id of the content document, `None` for directories
    pub document: Option<i64>,
    pub creation_date: DateTime<Utc>,
    pub last_modification: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = file_node)]
pub struct FileNodeRow {
    id: i64,
    project_id: i64,
    path: String,
    kind: String,
    document_id: Option<i64>,
    creation_date: DateTime<Utc>,
    last_modification: DateTime<Utc>,
}

impl From<FileNodeRow> for FileNode {
    fn from(row: FileNodeRow) -> Self {
        Self {
            id: row.id,
            project: row.project_id,
            path: row.path,
            kind: row.kind.parse().expect("unknown file kind stored in database"),
            document: row.document_id,
            creation_date: row.creation_date,
            last_modification: row.last_modification,
        }
    }
}

#[derive(Debug, Default, Clone, Insertable, AsChangeset)]
#[diesel(table_name = file_node)]
pub struct FileNodeChangeset {
    pub project_id: Option<i64>,
    pub path: Option<String>,
    pub kind: Option<String>,
    pub document_id: Option<Option<i64>>,
    pub creation_date: Option<DateTime<Utc>>,
    pub last_modification: Option<DateTime<Utc>>,
}

impl FileNodeChangeset {
    pub fn project(mut self, project: i64) -> Self {
        self.project_id = Some(project);
        self
    }

    pub fn path(mut self, path: String) -> Self {
        self.path = Some(path);
        self
    }

    pub fn flat_path(mut self, path: Option<String>) -> Self {
        if let Some(path) = path {
            self.path = Some(path);
        }
        self
    }

    pub fn kind(mut self, kind: FileKind) -> Self {
        self.kind = Some(kind.to_string());
        self
    }

    pub fn document(mut self, document: Option<i64>) -> Self {
        self.document_id = Some(document);
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

impl From<FileNode> for FileNodeChangeset {
    fn from(node: FileNode) -> Self {
        Self {
            project_id: Some(node.project),
            path: Some(node.path),
            kind: Some(node.kind.to_string()),
            document_id: Some(node.document),
            creation_date: Some(node.creation_date),
            last_modification: Some(node.last_modification),
        }
    }
}

impl Model for FileNode {
    type Row = FileNodeRow;
    type Changeset = FileNodeChangeset;
    type Table = file_node::table;
}

impl Identifiable for FileNode {
    fn get_id(&self) -> i64 {
        self.id
    }
}

impl PreferredId<i64> for FileNode {}

impl Create<FileNode> for FileNodeChangeset {
    type Error = atelier_models::Error;

    async fn create(self, conn: &mut DbConnection) -> Result<FileNode, Self::Error> {
        let row: FileNodeRow = diesel::insert_into(file_node::table)
            .values(&self)
            .returning(FileNodeRow::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(FileNode::from_row(row))
    }
}

impl Retrieve<i64> for FileNode {
    type Error = atelier_models::Error;

    async fn retrieve(conn: DbConnection, file_id: i64) -> Result<Option<Self>, Self::Error> {
        let row = file_node::table
            .find(file_id)
            .select(FileNodeRow::as_select())
            .first::<FileNodeRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(FileNode::from_row))
    }
}

impl Update<i64, FileNode> for FileNodeChangeset {
    type Error = atelier_models::Error;

    async fn update(
        self,
        conn: &mut DbConnection,
        file_id: i64,
    ) -> Result<Option<FileNode>, Self::Error> {
        let row = diesel::update(file_node::table.find(file_id))
            .set(&self)
            .returning(FileNodeRow::as_returning())
            .get_result::<FileNodeRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(FileNode::from_row))
    }
}

impl List for FileNode {
    type Error = atelier_models::Error;

    async fn list(
        conn: &mut DbConnection,
        settings: SelectionSettings<Self>,
    ) -> Result<Vec<Self>, Self::Error> {
        let mut query = file_node::table
            .select(FileNodeRow::as_select())
            .into_boxed();
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
            .load::<FileNodeRow>(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(rows.into_iter().map(FileNode::from_row).collect())
    }
}

impl Count for FileNode {
    type Error = atelier_models::Error;

    async fn count(
        conn: &mut DbConnection,
        settings: SelectionSettings<Self>,
    ) -> Result<u64, Self::Error> {
        let mut query = file_node::table.into_boxed();
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

impl FileNode {
    pub async fn find_by_path(
        conn: &mut DbConnection,
        project_id: i64,
        path: &str,
    ) -> Result<Option<FileNode>, atelier_models::Error> {
        let row = file_node::table
            .filter(file_node::project_id.eq(project_id))
            .filter(file_node::path.eq(path))
            .select(FileNodeRow::as_select())
            .first::<FileNodeRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(FileNode::from_row))
    }

    /// The content document keys of every file of a project
    pub async fn content_keys(
        conn: &mut DbConnection,
        project_id: i64,
    ) -> Result<Vec<i64>, atelier_models::Error> {
        file_node::table
            .filter(file_node::project_id.eq(project_id))
            .filter(file_node::document_id.is_not_null())
            .select(file_node::document_id.assume_not_null())
            .load::<i64>(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)
    }

    /// Deletes this node and, for directories, every node below it
    ///
    /// Content documents of the deleted files are deleted along.
    #[tracing::instrument(skip(conn, self), fields(file_id = self.id, path = %self.path), err)]
    pub async fn delete_subtree(self, conn: &mut DbConnection) -> Result<(), atelier_models::Error> {
        conn.transaction(|mut conn| {
            async move {
                let prefix = format!("{}/%", self.path);
                let content_keys: Vec<Option<i64>> = diesel::delete(
                    file_node::table
                        .filter(file_node::project_id.eq(self.project))
                        .filter(file_node::path.eq(self.path.clone()).or(file_node::path.like(prefix))),
                )
                .returning(file_node::document_id)
                .get_results(conn.write().await.deref_mut())
                .await
                .map_err(atelier_models::Error::from)?;
                for document_key in content_keys.into_iter().flatten() {
                    Document::delete_static(&mut conn, document_key).await?;
                }
                Ok(())
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

    use crate::models::fixtures::create_directory;
    use crate::models::fixtures::create_file;
    use crate::models::fixtures::create_project;
    use crate::models::fixtures::create_user;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn duplicate_path_is_a_unique_violation() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let project = create_project(&mut db_pool.get_ok(), owner.id, "test_project").await;
        let _first = create_file(&mut db_pool.get_ok(), project.id, "src/main.rs", "").await;

        let error = FileNode::changeset()
            .project(project.id)
            .path("src/main.rs".to_owned())
            .kind(FileKind::File)
            .document(None)
            .creation_date(Utc::now())
            .last_modification(Utc::now())
            .create(&mut db_pool.get_ok())
            .await
            .expect_err("creating a duplicate path should fail");

        assert!(matches!(
            error,
            atelier_models::Error::UniqueViolation { ref constraint, .. }
                if constraint == "file_node_project_id_path_key"
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn same_path_in_another_project_is_fine() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let first = create_project(&mut db_pool.get_ok(), owner.id, "first").await;
        let second = create_project(&mut db_pool.get_ok(), owner.id, "second").await;

        let _a = create_file(&mut db_pool.get_ok(), first.id, "src/main.rs", "").await;
        let _b = create_file(&mut db_pool.get_ok(), second.id, "src/main.rs", "").await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn directory_deletion_removes_the_subtree() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let project = create_project(&mut db_pool.get_ok(), owner.id, "test_project").await;

        let dir = create_directory(&mut db_pool.get_ok(), project.id, "src").await;
        let nested = create_file(&mut db_pool.get_ok(), project.id, "src/main.rs", "x").await;
        let sibling = create_file(&mut db_pool.get_ok(), project.id, "srcish.txt", "y").await;
        let nested_content = nested.document.unwrap();

        dir.delete_subtree(&mut db_pool.get_ok())
            .await
            .expect("Failed to delete directory");

        assert_eq!(
            FileNode::find_by_path(&mut db_pool.get_ok(), project.id, "src/main.rs")
                .await
                .unwrap(),
            None
        );
        assert!(
            !Document::exists(&mut db_pool.get_ok(), nested_content)
                .await
                .unwrap(),
            "deleted file contents should be pruned"
        );
        // the prefix match is per path segment, `srcish.txt` must survive
        assert!(
            FileNode::find_by_path(&mut db_pool.get_ok(), project.id, "srcish.txt")
                .await
                .unwrap()
                .is_some()
        );
        let _ = sibling;
    }
}
