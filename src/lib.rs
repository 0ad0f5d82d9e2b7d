#![forbid(unsafe_code)]

//! Channel → videos → transcripts ingestion for YouTube.
//!
//! The library is split along the pipeline: [`youtube`] talks to the Data API,
//! [`transcripts`] owns the on-disk caption cache, [`table`] writes CSV
//! snapshots and [`store`] upserts everything into SQLite. [`pipeline`] ties
//! them together for one channel handle at a time.

pub mod cli;
pub mod config;
pub mod engagement;
pub mod error;
pub mod layout;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod table;
pub mod transcripts;
pub mod youtube;

pub use error::PlatformError;
