//! In-process stores for entity sets and union analyses.
//!
//! Both stores are keyed by identifier with atomic-swap semantics: a reader
//! sees either the pre-update or the post-update record, never a partial
//! one, and is never blocked behind a writer. Lifecycle transitions and
//! renames go through `update`, which mutates the latest record rather
//! than replacing it with a caller-held snapshot; `version` increments on
//! every write so extensions performing read-modify-write can detect
//! staleness.

use std::sync::Arc;

use dashmap::DashMap;

use super::models::{AnalysisId, EntitySet, SetId, UnionAnalysisResult};

/// Persists entity-set records and their materialized member collections.
#[derive(Debug, Default)]
pub struct EntitySetStore {
    records: DashMap<SetId, EntitySet>,
    members: DashMap<SetId, Arc<Vec<String>>>,
}

impl EntitySetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a record, bumping `version` when it replaces an existing one.
    /// Returns the record as stored.
    pub fn save(&self, mut set: EntitySet) -> EntitySet {
        if let Some(existing) = self.records.get(&set.id) {
            set.version = existing.version + 1;
        }
        self.records.insert(set.id, set.clone());
        set
    }

    pub fn get(&self, id: SetId) -> Option<EntitySet> {
        self.records.get(&id).map(|entry| entry.clone())
    }

    /// Tolerant multi-read: unknown ids are silently omitted.
    pub fn get_many(&self, ids: &[SetId]) -> Vec<EntitySet> {
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }

    /// Mutate the current record in place under its shard lock, bumping
    /// `version`. `None` if the id is unknown (including a record deleted
    /// between the caller's read and this call). Concurrent writers each see
    /// the latest record, so no write is lost to a stale snapshot.
    pub fn update(&self, id: SetId, f: impl FnOnce(&mut EntitySet)) -> Option<EntitySet> {
        let mut entry = self.records.get_mut(&id)?;
        f(entry.value_mut());
        entry.version += 1;
        Some(entry.value().clone())
    }

    /// Replace a set's name, bumping `version`. `None` if the id is unknown.
    pub fn rename(&self, id: SetId, name: impl Into<String>) -> Option<EntitySet> {
        let name = name.into();
        self.update(id, |set| set.name = name)
    }

    pub fn put_members(&self, id: SetId, members: Vec<String>) {
        self.members.insert(id, Arc::new(members));
    }

    pub fn get_members(&self, id: SetId) -> Option<Arc<Vec<String>>> {
        self.members.get(&id).map(|entry| Arc::clone(&entry))
    }

    pub fn delete(&self, id: SetId) -> Option<EntitySet> {
        self.members.remove(&id);
        self.records.remove(&id).map(|(_, set)| set)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Persists union-analysis records.
#[derive(Debug, Default)]
pub struct UnionAnalysisStore {
    records: DashMap<AnalysisId, UnionAnalysisResult>,
}

impl UnionAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, mut analysis: UnionAnalysisResult) -> UnionAnalysisResult {
        if let Some(existing) = self.records.get(&analysis.id) {
            analysis.version = existing.version + 1;
        }
        self.records.insert(analysis.id, analysis.clone());
        analysis
    }

    pub fn get(&self, id: AnalysisId) -> Option<UnionAnalysisResult> {
        self.records.get(&id).map(|entry| entry.clone())
    }

    /// In-place counterpart of [`EntitySetStore::update`].
    pub fn update(
        &self,
        id: AnalysisId,
        f: impl FnOnce(&mut UnionAnalysisResult),
    ) -> Option<UnionAnalysisResult> {
        let mut entry = self.records.get_mut(&id)?;
        f(entry.value_mut());
        entry.version += 1;
        Some(entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
