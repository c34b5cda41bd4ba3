use std::fmt::Debug;
use std::result::Result;

use database::DbConnection;

use super::Model;

/// Describes how a [Model] can be created in the database
///
/// Implemented by the changeset type of a model.
pub trait Create<M: Model>: Sized {
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Creates a new row in the database with the values of the changeset and
    /// returns the created model instance
    async fn create(self, conn: &mut DbConnection) -> Result<M, Self::Error>;

    /// Just like [Create::create] but discards the error if any and returns `Err(fail())` instead
    async fn create_or_fail<E: From<Self::Error>, F: FnOnce() -> E + Send>(
        self,
        conn: &mut DbConnection,
        fail: F,
    ) -> std::result::Result<M, E> {
        match self.create(conn).await {
            Ok(obj) => Ok(obj),
            Err(_) => Err(fail()),
        }
    }
}

/// Describes how a [Model] can be created in the database given a batch of its changesets
pub trait CreateBatch: Model {
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Creates a batch of rows in the database given an iterator of changesets
    ///
    /// Returns a collection of the created rows.
    async fn create_batch<
        I: IntoIterator<Item = Self::Changeset> + Send,
        C: Default + std::iter::Extend<Self> + Send + Debug,
    >(
        conn: &mut DbConnection,
        values: I,
    ) -> Result<C, Self::Error>;
}
