//! ratefeed Store
//!
//! PostgreSQL side of the rate pipeline: reads the latest persisted snapshot
//! for the cache reader and listens for change notifications on the rate
//! table.

pub mod error;
pub mod listener;
pub mod pg;
pub mod schema;

pub use error::StoreError;
pub use listener::{PgChangeListener, DEFAULT_NOTIFY_CHANNEL};
pub use pg::PgRateStore;
pub use schema::ensure_schema;
