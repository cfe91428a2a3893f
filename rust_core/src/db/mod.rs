//! Postgres persistence for entity state and validated quotes.

pub mod pool;
pub mod retry;
pub mod storage;

pub use pool::{create_pool, DbPoolConfig};
pub use retry::{execute_with_retry, RetryPolicy};
pub use storage::{PgStorage, TracingStorage};
