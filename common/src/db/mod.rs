// Database layer module
// PostgreSQL connection pool and the account lookup used by the enrichment job

pub mod accounts;
pub mod pool;

pub use accounts::{AccountDirectory, PgAccountDirectory};
pub use pool::DbPool;
