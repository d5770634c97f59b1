//! threadboard-server: threaded comment board
//!
//! Posts carry a tree of comments. Two interchangeable storage engines
//! (in-memory and Postgres) implement one [`Storage`] contract, a
//! [`CommentBroadcaster`] fans new comments out to live observers, and the
//! [`BoardService`] ties the two together behind an axum HTTP surface.

pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod service;
pub mod store;

pub use broadcast::{BroadcastStats, CommentBroadcaster, Subscription};
pub use config::{BoardConfig, ConfigError, StorageKind, Timeouts};
pub use error::{StoreError, StoreResult};
pub use service::BoardService;
pub use store::{open_storage, MemoryStore, PostgresStore, Storage};
