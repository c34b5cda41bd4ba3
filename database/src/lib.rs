pub mod db_connection_pool;
pub mod tables;

pub use db_connection_pool::DbConnection;
pub use db_connection_pool::DbConnectionPoolV2;

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("database error: '{0}'")]
pub struct DatabaseError(#[from] pub diesel::result::Error);
