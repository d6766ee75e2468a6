//! netroster — net-management service core: the pre-check-in ingestion and
//! enrichment pipeline.
//!
//! Flow: [`listing`] fetches and parses the externally hosted pre-check-in
//! text; [`enrich`] augments call signs from the external directory via a
//! TTL'd cache; [`pipeline`] resolves operators, registers participants,
//! and drives batches with per-item failure isolation; [`server`] exposes
//! the two HTTP endpoints the UI calls.

pub mod config;
pub mod db;
pub mod directory;
pub mod enrich;
pub mod listing;
pub mod model;
pub mod pipeline;
pub mod server;
