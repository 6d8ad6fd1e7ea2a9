// Genomic Data Portal - Entity Set API
//
// This crate provides the entity-set subsystem of the portal API: persisting
// search results as named, typed sets of entity identifiers, combining
// existing sets with union/intersection algebra, and streaming materialized
// sets out as delimited exports or manifest archives.
//
// The search index that answers filtered queries is an external collaborator
// (see kernel::search); this crate owns the set lifecycle, the set algebra,
// and the store.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
