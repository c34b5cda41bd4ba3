use std::ops::DerefMut;

use chrono::DateTime;
use chrono::Utc;
use database::DbConnection;
use database::tables::friendship;
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
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

/// A directed friend edge: the requester asked, the addressee accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Friendship {
    pub id: i64,
    pub requester: i64,
    pub addressee: i64,
    pub status: FriendshipStatus,
    pub creation_date: DateTime<Utc>,
}

#[derive(Debug, Queryable, Selectable)]
#[diesel(table_name = friendship)]
pub struct FriendshipRow {
    id: i64,
    requester_id: i64,
    addressee_id: i64,
    status: String,
    creation_date: DateTime<Utc>,
}

impl From<FriendshipRow> for Friendship {
    fn from(row: FriendshipRow) -> Self {
        Self {
            id: row.id,
            requester: row.requester_id,
            addressee: row.addressee_id,
            status: row
                .status
                .parse()
                .expect("unknown friendship status stored in database"),
            creation_date: row.creation_date,
        }
    }
}

#[derive(Debug, Default, Clone, Insertable, AsChangeset)]
#[diesel(table_name = friendship)]
pub struct FriendshipChangeset {
    pub requester_id: Option<i64>,
    pub addressee_id: Option<i64>,
    pub status: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
}

impl FriendshipChangeset {
    pub fn requester(mut self, requester: i64) -> Self {
        self.requester_id = Some(requester);
        self
    }

    pub fn addressee(mut self, addressee: i64) -> Self {
        self.addressee_id = Some(addressee);
        self
    }

    pub fn status(mut self, status: FriendshipStatus) -> Self {
        self.status = Some(status.to_string());
        self
    }

    pub fn creation_date(mut self, creation_date: DateTime<Utc>) -> Self {
        self.creation_date = Some(creation_date);
        self
    }
}

impl From<Friendship> for FriendshipChangeset {
    fn from(friendship: Friendship) -> Self {
        Self {
            requester_id: Some(friendship.requester),
            addressee_id: Some(friendship.addressee),
            status: Some(friendship.status.to_string()),
            creation_date: Some(friendship.creation_date),
        }
    }
}

impl Model for Friendship {
    type Row = FriendshipRow;
    type Changeset = FriendshipChangeset;
    type Table = friendship::table;
}

impl Identifiable for Friendship {
    fn get_id(&self) -> i64 {
        self.id
    }
}

impl PreferredId<i64> for Friendship {}

impl Create<Friendship> for FriendshipChangeset {
    type Error = atelier_models::Error;

    async fn create(self, conn: &mut DbConnection) -> Result<Friendship, Self::Error> {
        let row: FriendshipRow = diesel::insert_into(friendship::table)
            .values(&self)
            .returning(FriendshipRow::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(Friendship::from_row(row))
    }
}

impl Retrieve<i64> for Friendship {
    type Error = atelier_models::Error;

    async fn retrieve(conn: DbConnection, friendship_id: i64) -> Result<Option<Self>, Self::Error> {
        let row = friendship::table
            .find(friendship_id)
            .select(FriendshipRow::as_select())
            .first::<FriendshipRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(Friendship::from_row))
    }
}

impl Update<i64, Friendship> for FriendshipChangeset {
    type Error = atelier_models::Error;

    async fn update(
        self,
        conn: &mut DbConnection,
        friendship_id: i64,
    ) -> Result<Option<Friendship>, Self::Error> {
        let row = diesel::update(friendship::table.find(friendship_id))
            .set(&self)
            .returning(FriendshipRow::as_returning())
            .get_result::<FriendshipRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(Friendship::from_row))
    }
}

impl DeleteStatic<i64> for Friendship {
    type Error = atelier_models::Error;

    async fn delete_static(
        conn: &mut DbConnection,
        friendship_id: i64,
    ) -> Result<bool, Self::Error> {
        diesel::delete(friendship::table.find(friendship_id))
            .execute(conn.write().await.deref_mut())
            .await
            .map(|deleted| deleted > 0)
            .map_err(atelier_models::Error::from)
    }
}

impl Friendship {
    /// The edge between two users, whichever direction it was requested in
    pub async fn between(
        conn: &mut DbConnection,
        a: i64,
        b: i64,
    ) -> Result<Option<Friendship>, atelier_models::Error> {
        let row = friendship::table
            .filter(
                friendship::requester_id
                    .eq(a)
                    .and(friendship::addressee_id.eq(b))
                    .or(friendship::requester_id
                        .eq(b)
                        .and(friendship::addressee_id.eq(a))),
            )
            .select(FriendshipRow::as_select())
            .first::<FriendshipRow>(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(atelier_models::Error::from)?;
        Ok(row.map(Friendship::from_row))
    }

    pub async fn list_for_user(
        conn: &mut DbConnection,
        user_id: i64,
        status: FriendshipStatus,
    ) -> Result<Vec<Friendship>, atelier_models::Error> {
        let rows = friendship::table
            .filter(
                friendship::requester_id
                    .eq(user_id)
                    .or(friendship::addressee_id.eq(user_id)),
            )
            .filter(friendship::status.eq(status.to_string()))
            .order_by(friendship::creation_date.desc())
            .select(FriendshipRow::as_select())
            .load::<FriendshipRow>(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(rows.into_iter().map(Friendship::from_row).collect())
    }

    /// Incoming requests still waiting for the user's answer
    pub async fn pending_for(
        conn: &mut DbConnection,
        user_id: i64,
    ) -> Result<Vec<Friendship>, atelier_models::Error> {
        let rows = friendship::table
            .filter(friendship::addressee_id.eq(user_id))
            .filter(friendship::status.eq(FriendshipStatus::Pending.to_string()))
            .order_by(friendship::creation_date.desc())
            .select(FriendshipRow::as_select())
            .load::<FriendshipRow>(conn.write().await.deref_mut())
            .await
            .map_err(atelier_models::Error::from)?;
        Ok(rows.into_iter().map(Friendship::from_row).collect())
    }

    /// The id of the other end of the edge
    pub fn other_end(&self, user_id: i64) -> i64 {
        if self.requester == user_id {
            self.addressee
        } else {
            self.requester
        }
    }
}
