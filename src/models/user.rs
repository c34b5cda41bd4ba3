use std::ops::DerefMut;

use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::auth_user;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use serde::Serialize;
use utoipa::ToSchema;

use atelier_models::prelude::*;
// an explicit import outranks the globs, `diesel::prelude` has its own Identifiable
use atelier_models::prelude::Identifiable;

/// Coarse authorization level of an account
///
/// Fine-grained access (who can edit which project) is driven by ownership
/// and collaborator rows, not roles.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub avatar: Option<i64>,
    pub creation_date: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = auth_user)]
pub struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    display_name: Option<String>,
    role: String,
    avatar_id: Option<i64>,
    creation_date: DateTime<Utc>,
    last_login: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            display_name: row.display_name,
            role: row.role.parse().expect("unknown role stored in database"),
            avatar: row.avatar_id,
            creation_date: row.creation_date,
            last_login: row.last_login,
        }
    }
}

#[derive(Debug, Default, Clone, Insertable, AsChangeset)]
#[diesel(table_name = auth_user)]
pub struct UserChangeset {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub display_name: Option<Option<String>>,
    pub role: Option<String>,
    pub avatar_id: Option<Option<i64>>,
    pub creation_date: Option<DateTime<Utc>>,
    pub last_login: Option<Option<DateTime<Utc>>>,
}

impl UserChangeset {
    pub fn username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    pub fn email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn password_hash(mut self, password_hash: String) -> Self {
        self.password_hash = Some(password_hash);
        self
    }

    pub fn display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = Some(display_name);
        self
    }

    pub fn flat_display_name(mut self, display_name: Option<Option<String>>) -> Self {
        if let Some(display_name) = display_name {
            self.display_name = Some(display_name);
        }
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role.to_string());
        self
    }

    pub fn avatar(mut self, avatar: Option<i64>) -> Self {
        self.avatar_id = Some(avatar);
        self
    }

    pub fn creation_date(mut self, creation_date: DateTime<Utc>) -> Self {
        self.creation_date = Some(creation_date);
        self
    }

    pub fn last_login(mut self, last_login: Option<DateTime<Utc>>) -> Self {
        self.last_login = Some(last_login);
        self
    }
}

impl From<User> for UserChangeset {
    fn from(user: User) -> Self {
        Self {
            username: Some(user.username),
            email: Some(user.email),
            password_hash: Some(user.password_hash),
            display_name: Some(user.display_name),
            role: Some(user.role.to_string()),
            avatar_id: Some(user.avatar),
            creation_date: Some(user.creation_date),
            last_login: Some(user.last_login),
        }
    }
}

impl Model for User {
    type Row = UserRow;
    type Changeset = UserChangeset;
    type Table = auth_user::table;
}

impl Identifiable for User {
    fn get_id(&self) -> i64 {
        self.id
    }
}

impl PreferredId<i64> for User {}

impl Create<User> for UserChangeset {
    type Error = atelier_models::Error;

    async fn create(self, conn: &mut DbConnection) -> Result<User, Self::Error> {
        let row: UserRow = diesel::insert_into(auth_user::table)
            .values(&self)
            .returning(UserRow::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(User::from_row(row))
    }
}

impl Retrieve<i64> for User {
    type Error = atelier_models::Error;

    async fn retrieve(conn: DbConnection, user_id: i64) -> Result<Option<Self>, Self::Error> {
        let row = auth_user::table
            .find(user_id)
            .select(UserRow::as_select())
            .first::<UserRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(User::from_row))
    }
}

impl Exists<i64> for User {
    type Error = atelier_models::Error;

    async fn exists(conn: &mut DbConnection, user_id: i64) -> Result<bool, Self::Error> {
        diesel::select(diesel::dsl::exists(auth_user::table.find(user_id)))
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)
    }
}

impl Update<i64, User> for UserChangeset {
    type Error = atelier_models::Error;

    async fn update(self, conn: &mut DbConnection, user_id: i64) -> Result<Option<User>, Self::Error> {
        let row = diesel::update(auth_user::table.find(user_id))
            .set(&self)
            .returning(UserRow::as_returning())
            .get_result::<UserRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(User::from_row))
    }
}

impl DeleteStatic<i64> for User {
    type Error = atelier_models::Error;

    async fn delete_static(conn: &mut DbConnection, user_id: i64) -> Result<bool, Self::Error> {
        diesel::delete(auth_user::table.find(user_id))
            .execute(conn.write().await.deref_mut())
            .await
            .map(|deleted| deleted > 0)
            .map_err(atelier_models::Error::from)
    }
}

impl List for User {
    type Error = atelier_models::Error;

    async fn list(
        conn: &mut DbConnection,
        settings: SelectionSettings<Self>,
    ) -> Result<Vec<Self>, Self::Error> {
        let mut query = auth_user::table.select(UserRow::as_select()).into_boxed();
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
            .load::<UserRow>(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(rows.into_iter().map(User::from_row).collect())
    }
}

impl Count for User {
    type Error = atelier_models::Error;

    async fn count(
        conn: &mut DbConnection,
        settings: SelectionSettings<Self>,
    ) -> Result<u64, Self::Error> {
        let mut query = auth_user::table.into_boxed();
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

impl User {
    pub async fn retrieve_by_username(
        conn: &mut DbConnection,
        username: &str,
    ) -> Result<Option<User>, atelier_models::Error> {
        let row = auth_user::table
            .filter(auth_user::username.eq(username))
            .select(UserRow::as_select())
            .first::<UserRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(User::from_row))
    }

    /// Stamps a successful login
    pub async fn touch_last_login(
        &mut self,
        conn: &mut DbConnection,
    ) -> Result<(), atelier_models::Error> {
        self.last_login = Some(Utc::now());
        self.save(conn).await?;
        Ok(())
    }

    /// Updates the avatar and deletes the old document if nothing references it anymore
    // self is skipped so the password hash never reaches the logs
    #[tracing::instrument(skip(conn, self), fields(user_id = self.id), ret, err)]
    pub async fn update_and_prune_avatar(
        &mut self,
        conn: &mut DbConnection,
        new_doc_id: Option<i64>,
    ) -> Result<(), atelier_models::Error> {
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        conn.transaction(|mut conn| {
            async move {
                let old_doc_id = self.avatar;
                self.avatar = new_doc_id;
                self.save(&mut conn).await?;
                if new_doc_id != old_doc_id
                    && let Some(old_doc_id) = old_doc_id
                {
                    crate::models::try_delete_document(&conn, old_doc_id).await?;
                }
                Ok::<_, atelier_models::Error>(())
            }
            .scope_boxed()
        })
        .await?;
        Ok(())
    }

    pub fn roles(&self) -> std::collections::HashSet<Role> {
        match self.role {
            // an admin can do anything a regular user can
            Role::Admin => [Role::Admin, Role::User].into(),
            Role::User => [Role::User].into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use database::DbConnectionPoolV2;
    use pretty_assertions::assert_eq;

    use crate::models::fixtures::create_user;

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn user_creation_and_lookup() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let created = create_user(&mut db_pool.get_ok(), "ada").await;

        let user = User::retrieve(db_pool.get_ok(), created.id)
            .await
            .expect("Failed to retrieve user")
            .expect("User not found");
        assert_eq!(user, created);

        let by_name = User::retrieve_by_username(&mut db_pool.get_ok(), "ada")
            .await
            .expect("Failed to retrieve user by username");
        assert_eq!(by_name, Some(user));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn duplicate_username_is_a_unique_violation() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let _first = create_user(&mut db_pool.get_ok(), "grace").await;

        let error = User::changeset()
            .username("grace".to_owned())
            .email("grace@elsewhere.example".to_owned())
            .password_hash("not-a-real-hash".to_owned())
            .role(Role::User)
            .creation_date(Utc::now())
            .create(&mut db_pool.get_ok())
            .await
            .expect_err("creating a duplicate username should fail");

        assert!(matches!(
            error,
            atelier_models::Error::UniqueViolation { ref column, .. } if column == "username"
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn touch_last_login_persists() {
        let db_pool = DbConnectionPoolV2::for_tests();
        let mut user = create_user(&mut db_pool.get_ok(), "linus").await;
        assert_eq!(user.last_login, None);

        user.touch_last_login(&mut db_pool.get_ok())
            .await
            .expect("Failed to update last login");

        let reloaded = User::retrieve(db_pool.get_ok(), user.id)
            .await
            .expect("Failed to retrieve user")
            .expect("User not found");
        assert!(reloaded.last_login.is_some());
    }
}
