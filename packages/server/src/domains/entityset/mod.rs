//! Entity sets: named, persisted collections of entity identifiers.
//!
//! A set is created either from a search query ([`EntitySetDefinition`]) or
//! from existing sets via union-of-terms algebra
//! ([`DerivedEntitySetDefinition`]). Creation may run synchronously or on the
//! background job runner; either way the set moves through the
//! `pending -> finished | error` lifecycle and is observed by polling.

pub mod algebra;
pub mod export;
pub mod models;
pub mod service;
pub mod store;

pub use models::{
    AnalysisId, AnalysisState, DerivedEntitySetDefinition, EntitySet, EntitySetDefinition,
    EntityType, SetId, SetState, SortOrder, UnionAnalysisResult, UnionUnit, UnionUnitWithCount,
};
pub use service::{EntitySetService, SetOperationLimits};
pub use store::{EntitySetStore, UnionAnalysisStore};
