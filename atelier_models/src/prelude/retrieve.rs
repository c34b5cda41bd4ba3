use std::result::Result;

use database::DbConnection;

use super::Model;

/// Describes how a [Model] can be retrieved from the database
pub trait Retrieve<K>: Model
where
    K: Send,
{
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Retrieves the row #`id` and deserializes it as a model instance
    async fn retrieve(conn: DbConnection, id: K) -> Result<Option<Self>, Self::Error>;

    /// Just like [Retrieve::retrieve] but returns `Err(fail())` if the row was not found
    async fn retrieve_or_fail<E, F>(conn: DbConnection, id: K, fail: F) -> Result<Self, E>
    where
        E: From<Self::Error>,
        F: FnOnce() -> E + Send,
    {
        match Self::retrieve(conn, id).await {
            Ok(Some(obj)) => Ok(obj),
            Ok(None) => Err(fail()),
            Err(e) => Err(E::from(e)),
        }
    }
}

/// Describes how to check for the existence of a [Model] in the database
pub trait Exists<K>: Model
where
    K: Send,
{
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Returns whether the row #`id` exists
    async fn exists(conn: &mut DbConnection, id: K) -> Result<bool, Self::Error>;
}
