//! Local catalog of fabric entities.
//!
//! [`CatalogStore`] keeps one row per `(item_type, uuid)` in SQLite with an
//! FTS5 index over names and paths. [`CatalogSyncer`] refreshes it from the
//! fabric one entity kind at a time.

mod fts;
mod query;
mod store;
mod sync;

pub use query::{build_fts5_query, escape_fts5_term, CatalogQuery, SortField, SortOrder, DEFAULT_LIMIT, MAX_LIMIT};
pub use store::{CatalogOverview, CatalogStore, HealthReport, KindOverview, SearchPage, SyncState};
pub use sync::{CatalogSyncer, KindReport, SyncMode, SyncReport};
