use std::ops::DerefMut;

use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::project_collaborator;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use serde::Serialize;
use utoipa::ToSchema;

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
pub enum CollaboratorRole {
    Editor,
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProjectCollaborator {
    pub id: i64,
    pub project: i64,
    pub user: i64,
    pub role: CollaboratorRole,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = project_collaborator)]
pub struct ProjectCollaboratorRow {
    id: i64,
    project_id: i64,
    user_id: i64,
    role: String,
    creation_date: DateTime<Utc>,
}

impl From<ProjectCollaboratorRow> for ProjectCollaborator {
    fn from(row: ProjectCollaboratorRow) -> Self {
        Self {
            id: row.id,
            project: row.project_id,
            user: row.user_id,
            role: row
                .role
                .parse()
                .expect("unknown collaborator role stored in database"),
            creation_date: row.creation_date,
        }
    }
}

#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = project_collaborator)]
pub struct ProjectCollaboratorChangeset {
    pub project_id: Option<i64>,
    pub user_id: Option<i64>,
    pub role: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
}

impl ProjectCollaboratorChangeset {
    pub fn project(mut self, project: i64) -> Self {
        self.project_id = Some(project);
        self
    }

    pub fn user(mut self, user: i64) -> Self {
        self.user_id = Some(user);
        self
    }

    pub fn role(mut self, role: CollaboratorRole) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn creation_date(mut self, creation_date: DateTime<Utc>) -> Self {
        self.creation_date = Some(creation_date);
        self
    }
}

impl From<ProjectCollaborator> for ProjectCollaboratorChangeset {
    fn from(collaborator: ProjectCollaborator) -> Self {
        Self {
            project_id: Some(collaborator.project),
            user_id: Some(collaborator.user),
            role: Some(collaborator.role.to_string()),
            creation_date: Some(collaborator.creation_date),
        }
    }
}

impl Model for ProjectCollaborator {
    type Row = ProjectCollaboratorRow;
    type Changeset = ProjectCollaboratorChangeset;
    type Table = project_collaborator::table;
}

impl Identifiable for ProjectCollaborator {
    fn get_id(&self) -> i64 {
        self.id
    }
}

impl Create<ProjectCollaborator> for ProjectCollaboratorChangeset {
    type Error = atelier_models::Error;

    async fn create(self, conn: &mut DbConnection) -> Result<ProjectCollaborator, Self::Error> {
        let row: ProjectCollaboratorRow = diesel::insert_into(project_collaborator::table)
            .values(&self)
            .returning(ProjectCollaboratorRow::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(ProjectCollaborator::from_row(row))
    }
}

impl ProjectCollaborator {
    pub async fn list_for_project(
        conn: &mut DbConnection,
        project_id: i64,
    ) -> Result<Vec<ProjectCollaborator>, atelier_models::Error> {
        let rows = project_collaborator::table
            .filter(project_collaborator::project_id.eq(project_id))
            .order_by(project_collaborator::creation_date.asc())
            .select(ProjectCollaboratorRow::as_select())
            .load::<ProjectCollaboratorRow>(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(rows.into_iter().map(ProjectCollaborator::from_row).collect())
    }

    pub async fn role_of(
        conn: &mut DbConnection,
        project_id: i64,
        user_id: i64,
    ) -> Result<Option<CollaboratorRole>, atelier_models::Error> {
        let role = project_collaborator::table
            .filter(project_collaborator::project_id.eq(project_id))
            .filter(project_collaborator::user_id.eq(user_id))
            .select(project_collaborator::role)
            .first::<String>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(role.map(|role| {
            role.parse()
                .expect("unknown collaborator role stored in database")
        }))
    }

    /// Returns `true` if the user actually was a collaborator
    pub async fn remove(
        conn: &mut DbConnection,
        project_id: i64,
        user_id: i64,
    ) -> Result<bool, atelier_models::Error> {
        diesel::delete(
            project_collaborator::table
                .filter(project_collaborator::project_id.eq(project_id))
                .filter(project_collaborator::user_id.eq(user_id)),
        )
        .execute(conn.write().await.deref_mut())
        .await
        .map(|deleted| deleted > 0)
        .map_err(atelier_models::Error::from)
    }
}
