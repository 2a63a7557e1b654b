//! SQLite persistence: connection pool and the run repository.

pub mod pool;
pub mod run;
