//! Database layer - connection pool and schema migrations
//!
//! Used only by the Postgres storage engine.

pub mod migrations;
pub mod pool;

pub use pool::{create_pool, create_pool_with_options};
