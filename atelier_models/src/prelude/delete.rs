use std::result::Result;

use database::DbConnection;

use super::Model;

/// Describes how a [Model] can be deleted from the database
pub trait Delete: Model {
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Deletes the row corresponding to this model instance
    ///
    /// Returns `true` if the row was deleted, `false` if it didn't exist
    async fn delete(&self, conn: &mut DbConnection) -> Result<bool, Self::Error>;

    /// Just like [Delete::delete] but returns `Err(fail())` if the row didn't exist
    async fn delete_or_fail<E, F>(&self, conn: &mut DbConnection, fail: F) -> Result<(), E>
    where
        E: From<Self::Error>,
        F: FnOnce() -> E + Send,
    {
        match self.delete(conn).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(fail()),
            Err(e) => Err(E::from(e)),
        }
    }
}

/// Describes how a [Model] can be deleted from the database
///
/// This trait is similar to [Delete] but it doesn't take a reference to the model
/// instance. This is useful for models that don't have to be retrieved before deletion.
pub trait DeleteStatic<K>: Model
where
    K: Send,
{
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Deletes the row #`id` from the database
    async fn delete_static(
        conn: &mut DbConnection,
        id: K,
    ) -> std::result::Result<bool, Self::Error>;

    /// Just like [DeleteStatic::delete_static] but returns `Err(fail())` if the row didn't exist
    async fn delete_static_or_fail<E, F>(conn: &mut DbConnection, id: K, fail: F) -> Result<(), E>
    where
        E: From<Self::Error>,
        F: FnOnce() -> E + Send,
    {
        match Self::delete_static(conn, id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(fail()),
            Err(e) => Err(E::from(e)),
        }
    }
}
