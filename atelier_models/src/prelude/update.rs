use database::DbConnection;
use diesel::result::Error::NotFound;

use super::Model;
use super::PreferredId;

/// Describes how a [Model] can be updated in the database
///
/// Implemented by the changeset type of a model. The models whose changeset
/// implements this trait also get [Save] for free, which provides a
/// convenient way to persist a modified model instance.
pub trait Update<K, M>: Sized
where
    K: Send,
    M: Model,
{
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Updates the row #`id` with the changeset values and returns the updated model
    async fn update(self, conn: &mut DbConnection, id: K) -> Result<Option<M>, Self::Error>;

    /// Just like [Update::update] but returns `Err(fail())` if the row was not found
    async fn update_or_fail<E, F>(self, conn: &mut DbConnection, id: K, fail: F) -> Result<M, E>
    where
        E: From<Self::Error>,
        F: FnOnce() -> E + Send,
    {
        match self.update(conn, id).await {
            Ok(Some(obj)) => Ok(obj),
            Ok(None) => Err(fail()),
            Err(e) => Err(E::from(e)),
        }
    }
}

/// Describes how a [Model] can be persisted to the database
///
/// This trait is automatically implemented for all models whose changeset
/// implements [Update].
pub trait Save<K: Send>: Model {
    type Error: std::error::Error + From<crate::Error> + Send;

    /// Persists the model instance to the database
    async fn save(&mut self, conn: &mut DbConnection) -> Result<(), Self::Error>;
}

impl<K, M> Save<K> for M
where
    K: Send + Clone,
    M: Model + PreferredId<K> + Clone + Send,
    <M as Model>::Changeset: Update<K, M> + Send,
{
    type Error = <<M as Model>::Changeset as Update<K, M>>::Error;

    async fn save(&mut self, conn: &mut DbConnection) -> Result<(), Self::Error> {
        let id = self.get_id();
        let changeset = <M as Model>::Changeset::from(self.clone());
        *self = changeset
            .update_or_fail(conn, id, || Self::Error::from(crate::Error::from(NotFound)))
            .await?;
        Ok(())
    }
}
