use std::sync::Arc;

use database::DbConnection;
use diesel::BoxableExpression;
use diesel::expression::expression_types::NotSelectable;
use diesel::pg::Pg;
use diesel::sql_types::Bool;

use super::Model;

/// A boxed boolean expression over the table of a model, usable as a WHERE clause
pub type DynFilterExpr<T> = Box<dyn BoxableExpression<T, Pg, SqlType = Bool>>;

/// A boxed expression over the table of a model, usable as an ORDER BY clause
pub type DynOrderExpr<T> = Box<dyn BoxableExpression<T, Pg, SqlType = NotSelectable>>;

type FilterBuilder<T> = Arc<dyn Fn() -> DynFilterExpr<T> + Send + Sync>;
type OrderBuilder<T> = Arc<dyn Fn() -> DynOrderExpr<T> + Send + Sync>;

/// Filtering, ordering and pagination settings of a SELECT/COUNT query on a model's table
///
/// Filters and orderings are stored as expression *builders* so that the same
/// settings can drive both the listing query and its counting counterpart.
/// The fields are public because the [List] and [Count] implementations live
/// next to each model, outside of this crate.
pub struct SelectionSettings<M: Model + 'static> {
    pub filters: Vec<FilterBuilder<M::Table>>,
    pub order_by: Vec<OrderBuilder<M::Table>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pagination: Option<(u64, u64)>,
}

impl<M: Model + 'static> Clone for SelectionSettings<M> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            order_by: self.order_by.clone(),
            limit: self.limit,
            offset: self.offset,
            pagination: self.pagination,
        }
    }
}

impl<M: Model + 'static> Default for SelectionSettings<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model + 'static> SelectionSettings<M> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            pagination: None,
        }
    }

    /// Pre-fills the limit and the offset from 1-based pagination settings
    pub fn from_pagination_settings(page: u64, page_size: u64) -> Self {
        let mut settings = Self::new()
            .limit(page_size)
            .offset((page - 1) * page_size);
        settings.pagination = Some((page, page_size));
        settings
    }

    /// The `(page, page_size)` this selection was built from, if any
    pub fn get_pagination_settings(&self) -> Option<(u64, u64)> {
        self.pagination
    }

    /// Adds a WHERE clause to the selection
    ///
    /// ```ignore
    /// let settings = SelectionSettings::new()
    ///     .filter(move || file_node::project_id.eq(project_id));
    /// ```
    pub fn filter<F, E>(mut self, f: F) -> Self
    where
        F: Fn() -> E + Send + Sync + 'static,
        E: BoxableExpression<M::Table, Pg, SqlType = Bool> + Send + 'static,
    {
        self.filters.push(Arc::new(move || Box::new(f())));
        self
    }

    /// Adds an ORDER BY clause to the selection; the closure returns a boxed
    /// expression so that the ordering can be chosen at runtime
    pub fn order_by<F>(mut self, f: F) -> Self
    where
        F: Fn() -> DynOrderExpr<M::Table> + Send + Sync + 'static,
    {
        self.order_by.push(Arc::new(f));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Describes how instances of a [Model] can be listed from the database
///
/// The implementation applies the filters, orderings, limit and offset of the
/// provided [SelectionSettings].
pub trait List: Model + 'static {
    type Error: std::error::Error + From<crate::Error> + Send;

    async fn list(
        conn: &mut DbConnection,
        settings: SelectionSettings<Self>,
    ) -> Result<Vec<Self>, Self::Error>;
}

/// Describes how instances of a [Model] can be counted in the database
///
/// Only the filters of the [SelectionSettings] apply: the count always covers
/// every matching row, regardless of pagination.
pub trait Count: Model + 'static {
    type Error: std::error::Error + From<crate::Error> + Send;

    async fn count(
        conn: &mut DbConnection,
        settings: SelectionSettings<Self>,
    ) -> Result<u64, Self::Error>;
}

/// Lists the models matching a selection alongside the total match count
pub trait ListAndCount: List + Count
where
    <Self as List>::Error: From<<Self as Count>::Error>,
{
    async fn list_and_count(
        conn: &mut DbConnection,
        settings: SelectionSettings<Self>,
    ) -> Result<(Vec<Self>, u64), <Self as List>::Error> {
        let count = Self::count(conn, settings.clone()).await?;
        let results = Self::list(conn, settings).await?;
        Ok((results, count))
    }
}

impl<T> ListAndCount for T
where
    T: List + Count + 'static,
    <T as List>::Error: From<<T as Count>::Error>,
{
}
