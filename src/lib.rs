//! Transcript scraper for the Tweede Kamer open-data feeds.
//!
//! Meetings and reports are read from two paginated Atom feeds (or from the
//! OData query API), joined by meeting id, and each transcript is fetched,
//! parsed, split into speaker segments and stored as one JSON file per meeting.

pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod model;
pub mod parser;
pub mod pool;
pub mod scraper;
pub mod store;
pub mod transcript;
