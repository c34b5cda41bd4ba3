use std::ops::DerefMut;

use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::project_rating;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use serde::Serialize;
use utoipa::ToSchema;

use atelier_models::prelude::*;
// an explicit import outranks the globs, `diesel::prelude` has its own Identifiable
use atelier_models::prelude::Identifiable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProjectRating {
    pub id: i64,
    pub project: i64,
    pub user: i64,
    /// 1 to 5, enforced by a check constraint
    pub score: i32,
    pub comment: Option<String>,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = project_rating)]
pub struct ProjectRatingRow {
    id: i64,
    project_id: i64,
    user_id: i64,
    score: i32,
    comment: Option<String>,
    creation_date: DateTime<Utc>,
}

impl From<ProjectRatingRow> for ProjectRating {
    fn from(row: ProjectRatingRow) -> Self {
        Self {
            id: row.id,
            project: row.project_id,
            user: row.user_id,
            score: row.score,
            comment: row.comment,
            creation_date: row.creation_date,
        }
    }
}

#[derive(Debug, Default, Clone, Insertable)]
#[diesel(table_name = project_rating)]
pub struct ProjectRatingChangeset {
    pub project_id: Option<i64>,
    pub user_id: Option<i64>,
    pub score: Option<i32>,
    pub comment: Option<Option<String>>,
    pub creation_date: Option<DateTime<Utc>>,
}

impl From<ProjectRating> for ProjectRatingChangeset {
    fn from(rating: ProjectRating) -> Self {
        Self {
            project_id: Some(rating.project),
            user_id: Some(rating.user),
            score: Some(rating.score),
            comment: Some(rating.comment),
            creation_date: Some(rating.creation_date),
        }
    }
}

impl Model for ProjectRating {
    type Row = ProjectRatingRow;
    type Changeset = ProjectRatingChangeset;
    type Table = project_rating::table;
}

impl Identifiable for ProjectRating {
    fn get_id(&self) -> i64 {
        self.id
    }
}

/// Count and mean of the scores of a project
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RatingSummary {
    pub count: u64,
    #[schema(required)]
    pub average: Option<f64>,
}

impl ProjectRating {
    /// Inserts or replaces the requester's rating of a project
    ///
    /// One rating per user and project, enforced by a unique constraint and
    /// resolved with an upsert.
    pub async fn upsert(
        conn: &mut DbConnection,
        project_id: i64,
        user_id: i64,
        score: i32,
        comment: Option<String>,
    ) -> Result<ProjectRating, atelier_models::Error> {
        let row: ProjectRatingRow = diesel::insert_into(project_rating::table)
            .values((
                project_rating::project_id.eq(project_id),
                project_rating::user_id.eq(user_id),
                project_rating::score.eq(score),
                project_rating::comment.eq(comment.clone()),
                project_rating::creation_date.eq(Utc::now()),
            ))
            .on_conflict((project_rating::project_id, project_rating::user_id))
            .do_update()
            .set((
                project_rating::score.eq(score),
                project_rating::comment.eq(comment),
            ))
            .returning(ProjectRatingRow::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(ProjectRating::from_row(row))
    }

    pub async fn list_for_project(
        conn: &mut DbConnection,
        project_id: i64,
    ) -> Result<Vec<ProjectRating>, atelier_models::Error> {
        let rows = project_rating::table
            .filter(project_rating::project_id.eq(project_id))
            .order_by(project_rating::creation_date.desc())
            .select(ProjectRatingRow::as_select())
            .load::<ProjectRatingRow>(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(rows.into_iter().map(ProjectRating::from_row).collect())
    }

    /// The average is computed from an integer sum, no lossy SQL numeric involved
    pub async fn summary(
        conn: &mut DbConnection,
        project_id: i64,
    ) -> Result<RatingSummary, atelier_models::Error> {
        use diesel::dsl::count_star;
        use diesel::dsl::sum;

        let (count, total): (i64, Option<i64>) = project_rating::table
            .filter(project_rating::project_id.eq(project_id))
            .select((count_star(), sum(project_rating::score)))
            .first(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        let average = total
            .filter(|_| count > 0)
            .map(|total| total as f64 / count as f64);
        Ok(RatingSummary {
            count: count as u64,
            average,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use database::DbConnectionPoolV2;
    use pretty_assertions::assert_eq;

    use crate::models::fixtures::create_project;
    use crate::models::fixtures::create_user;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn upsert_replaces_the_previous_rating() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let rater = create_user(&mut db_pool.get_ok(), "rater").await;
        let project = create_project(&mut db_pool.get_ok(), owner.id, "rated").await;

        ProjectRating::upsert(&mut db_pool.get_ok(), project.id, rater.id, 2, None)
            .await
            .expect("Failed to rate project");
        ProjectRating::upsert(
            &mut db_pool.get_ok(),
            project.id,
            rater.id,
            5,
            Some("better on second look".to_owned()),
        )
        .await
        .expect("Failed to re-rate project");

        let ratings = ProjectRating::list_for_project(&mut db_pool.get_ok(), project.id)
            .await
            .expect("Failed to list ratings");
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].score, 5);

        let summary = ProjectRating::summary(&mut db_pool.get_ok(), project.id)
            .await
            .expect("Failed to summarize ratings");
        assert_eq!(summary.count, 1);
        assert_eq!(summary.average, Some(5.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn summary_of_an_unrated_project_is_empty() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let owner = create_user(&mut db_pool.get_ok(), "owner").await;
        let project = create_project(&mut db_pool.get_ok(), owner.id, "unrated").await;

        let summary = ProjectRating::summary(&mut db_pool.get_ok(), project.id)
            .await
            .expect("Failed to summarize ratings");
        assert_eq!(
            summary,
            RatingSummary {
                count: 0,
                average: None
            }
        );
    }
}
