//! Binary payload storage.
//!
//! A document is an opaque blob with a content type, identified by a unique
//! key (`i64`). File contents, avatars and project images all live here and
//! reference their document by key.

use std::fmt::Debug;
use std::ops::DerefMut;

use database::DbConnection;
use database::tables::document;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::prelude::*;
// an explicit import outranks the globs, `diesel::prelude` has its own Identifiable
use crate::prelude::Identifiable;

#[derive(Debug, Default, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = document)]
pub struct Document {
    pub id: i64,
    pub content_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Default, Clone, Insertable, AsChangeset)]
#[diesel(table_name = document)]
pub struct DocumentChangeset {
    pub content_type: Option<String>,
    pub data: Option<Vec<u8>>,
}

impl DocumentChangeset {
    pub fn content_type(mut self, content_type: String) -> Self {
        self.content_type = Some(content_type);
        self
    }

    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<Document> for DocumentChangeset {
    fn from(document: Document) -> Self {
        Self {
            content_type: Some(document.content_type),
            data: Some(document.data),
        }
    }
}

impl Model for Document {
    type Row = Document;
    type Changeset = DocumentChangeset;
    type Table = document::table;
}

impl Identifiable for Document {
    fn get_id(&self) -> i64 {
        self.id
    }
}

impl PreferredId<i64> for Document {}

impl Create<Document> for DocumentChangeset {
    type Error = crate::Error;

    async fn create(self, conn: &mut DbConnection) -> Result<Document, Self::Error> {
        let document = diesel::insert_into(document::table)
            .values(&self)
            .returning(Document::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(crate::Error::from)?;
        Ok(document)
    }
}

impl CreateBatch for Document {
    type Error = crate::Error;

    async fn create_batch<
        I: IntoIterator<Item = Self::Changeset> + Send,
        C: Default + std::iter::Extend<Self> + Send + Debug,
    >(
        conn: &mut DbConnection,
        values: I,
    ) -> Result<C, Self::Error> {
        let changesets = values.into_iter().collect::<Vec<_>>();
        let documents = diesel::insert_into(document::table)
            .values(&changesets)
            .returning(Document::as_returning())
            .load(conn.write().await.deref_mut())
            .await
            .map_err(crate::Error::from)?;
        let mut collection = C::default();
        collection.extend(documents);
        Ok(collection)
    }
}

impl Retrieve<i64> for Document {
    type Error = crate::Error;

    async fn retrieve(conn: DbConnection, document_key: i64) -> Result<Option<Self>, Self::Error> {
        document::table
            .find(document_key)
            .select(Document::as_select())
            .first(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(crate::Error::from)
    }
}

impl Update<i64, Document> for DocumentChangeset {
    type Error = crate::Error;

    async fn update(
        self,
        conn: &mut DbConnection,
        document_key: i64,
    ) -> Result<Option<Document>, Self::Error> {
        diesel::update(document::table.find(document_key))
            .set(&self)
            .returning(Document::as_returning())
            .get_result(conn.write().await.deref_mut())
            .await
            .optional()
            .map_err(crate::Error::from)
    }
}

impl DeleteStatic<i64> for Document {
    type Error = crate::Error;

    async fn delete_static(
        conn: &mut DbConnection,
        document_key: i64,
    ) -> Result<bool, Self::Error> {
        diesel::delete(document::table.find(document_key))
            .execute(conn.write().await.deref_mut())
            .await
            .map(|deleted| deleted > 0)
            .map_err(crate::Error::from)
    }
}

impl Exists<i64> for Document {
    type Error = crate::Error;

    async fn exists(conn: &mut DbConnection, document_key: i64) -> Result<bool, Self::Error> {
        diesel::select(diesel::dsl::exists(document::table.find(document_key)))
            .get_result(conn.write().await.deref_mut())
            .await
            .map_err(crate::Error::from)
    }
}
