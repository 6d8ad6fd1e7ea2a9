//! Entity-set operations: creation, combination, analysis, lookup.
//!
//! Submissions persist a pending record first, then materialize either
//! inline (synchronous callers block until the terminal state) or on the
//! job runner (asynchronous callers poll). Materialization failures are
//! recorded on the record, never propagated: by then there is no caller
//! left to catch them.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::common::ServiceError;
use crate::config::Config;
use crate::kernel::jobs::JobRunner;
use crate::kernel::search::SearchService;

use super::algebra::{compute_union, term_count};
use super::models::{
    AnalysisId, AnalysisState, DerivedEntitySetDefinition, EntitySet, EntitySetDefinition, SetId,
    SetState, UnionAnalysisResult, UnionUnitWithCount,
};
use super::store::{EntitySetStore, UnionAnalysisStore};

/// Server-side ceilings on set operations.
#[derive(Debug, Clone)]
pub struct SetOperationLimits {
    pub max_set_size: usize,
    pub max_preview_size: usize,
    pub search_timeout: Duration,
}

impl From<&Config> for SetOperationLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_set_size: config.max_set_size,
            max_preview_size: config.max_preview_size,
            search_timeout: config.search_timeout,
        }
    }
}

/// A service to facilitate entity set operations.
pub struct EntitySetService {
    store: Arc<EntitySetStore>,
    analyses: Arc<UnionAnalysisStore>,
    search: Arc<dyn SearchService>,
    runner: Arc<JobRunner>,
    limits: SetOperationLimits,
}

impl EntitySetService {
    pub fn new(
        store: Arc<EntitySetStore>,
        analyses: Arc<UnionAnalysisStore>,
        search: Arc<dyn SearchService>,
        runner: Arc<JobRunner>,
        limits: SetOperationLimits,
    ) -> Self {
        Self {
            store,
            analyses,
            search,
            runner,
            limits,
        }
    }

    pub fn store(&self) -> &EntitySetStore {
        &self.store
    }

    pub fn analyses(&self) -> &UnionAnalysisStore {
        &self.analyses
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Create a set from a search query. Validation happens before any
    /// record exists; a failed submission leaves the store untouched.
    pub async fn create(
        self: &Arc<Self>,
        definition: EntitySetDefinition,
        run_async: bool,
    ) -> Result<EntitySet, ServiceError> {
        definition.validate()?;

        let pending = self.store.save(EntitySet::from_definition(&definition));
        let id = pending.id;
        debug!(set_id = %id, name = %pending.name, "created pending entity set");

        if run_async {
            let service = Arc::clone(self);
            self.dispatch(pending, "entityset:materialize-query", async move {
                service.materialize_query(id, definition).await;
            })
        } else {
            self.materialize_query(id, definition).await;
            Ok(self.store.get(id).unwrap_or(pending))
        }
    }

    /// Create a set from existing sets via union-of-terms algebra.
    pub async fn combine(
        self: &Arc<Self>,
        definition: DerivedEntitySetDefinition,
        run_async: bool,
    ) -> Result<EntitySet, ServiceError> {
        definition.validate()?;

        let pending = self.store.save(EntitySet::from_derived_definition(&definition));
        let id = pending.id;
        debug!(set_id = %id, terms = definition.union_definitions.len(), "created pending derived set");

        if run_async {
            let service = Arc::clone(self);
            self.dispatch(pending, "entityset:materialize-union", async move {
                service.materialize_union(id, definition).await;
            })
        } else {
            self.materialize_union(id, definition).await;
            Ok(self.store.get(id).unwrap_or(pending))
        }
    }

    /// Compute per-unit cardinalities without persisting a new set. Always
    /// asynchronous; callers poll the returned pending record.
    pub async fn analyze(
        self: &Arc<Self>,
        definition: DerivedEntitySetDefinition,
    ) -> Result<UnionAnalysisResult, ServiceError> {
        definition.validate()?;

        let pending = self.analyses.save(UnionAnalysisResult::new_pending(
            definition.entity_type,
            definition.union_definitions.len(),
        ));
        let id = pending.id;

        let service = Arc::clone(self);
        match self.runner.submit("analysis:union-counts", async move {
            service.run_analysis(id, definition).await;
        }) {
            Ok(()) => Ok(pending),
            Err(e) => {
                error!(analysis_id = %id, error = %e, "failed to enqueue analysis");
                Ok(self
                    .analyses
                    .update(id, |analysis| {
                        analysis.state = AnalysisState::Error {
                            reason: "job queue unavailable".into(),
                        }
                    })
                    .unwrap_or(pending))
            }
        }
    }

    /// A small literal sample of the union result, computed synchronously
    /// and never persisted.
    pub fn preview(&self, definition: &DerivedEntitySetDefinition) -> Result<Vec<String>, ServiceError> {
        definition.validate()?;

        let mut ids = compute_union(&definition.union_definitions, |set_id| {
            self.resolve_finished_members(*set_id)
        });
        // Deterministic sample: sort before capping.
        ids.sort_unstable();
        ids.truncate(self.limits.max_preview_size);
        Ok(ids)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    pub fn get(&self, id: SetId) -> Result<EntitySet, ServiceError> {
        self.store
            .get(id)
            .ok_or(ServiceError::NotFound(id.as_uuid()))
    }

    pub fn get_many(&self, ids: &[SetId]) -> Vec<EntitySet> {
        self.store.get_many(ids)
    }

    pub fn get_analysis(&self, id: AnalysisId) -> Result<UnionAnalysisResult, ServiceError> {
        self.analyses
            .get(id)
            .ok_or(ServiceError::NotFound(id.as_uuid()))
    }

    pub fn rename(&self, id: SetId, name: &str) -> Result<EntitySet, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::InvalidDefinition(
                "'name' must not be empty".into(),
            ));
        }
        self.store
            .rename(id, name)
            .ok_or(ServiceError::NotFound(id.as_uuid()))
    }

    pub fn delete(&self, id: SetId) -> Result<EntitySet, ServiceError> {
        self.store
            .delete(id)
            .ok_or(ServiceError::NotFound(id.as_uuid()))
    }

    /// Member list of a finished set.
    pub fn members(&self, set: &EntitySet) -> Result<Arc<Vec<String>>, ServiceError> {
        if !set.state.is_finished() {
            return Err(ServiceError::Export(format!(
                "set '{}' is not finished",
                set.id
            )));
        }
        self.store
            .get_members(set.id)
            .ok_or_else(|| ServiceError::Export(format!("set '{}' has no materialized members", set.id)))
    }

    // ========================================================================
    // Materialization (job runner is the sole writer of lifecycle state)
    // ========================================================================

    async fn materialize_query(&self, id: SetId, definition: EntitySetDefinition) {
        if self.store.get(id).is_none() {
            error!(set_id = %id, "pending record disappeared before materialization");
            return;
        }

        let limit = definition.effective_limit(self.limits.max_set_size);
        let outcome = tokio::time::timeout(
            self.limits.search_timeout,
            self.search.search(
                &definition.filters,
                definition.entity_type,
                &definition.sort_by,
                definition.sort_order,
                limit,
            ),
        )
        .await;

        match outcome {
            Ok(Ok(mut hits)) => {
                hits.ids.truncate(limit);
                if hits.total > hits.ids.len() as u64 {
                    debug!(
                        set_id = %id,
                        total = hits.total,
                        kept = hits.ids.len(),
                        "query result truncated to effective limit"
                    );
                }
                let count = hits.ids.len() as u64;
                self.store.put_members(id, hits.ids);
                match self.transition(id, SetState::Finished { count }) {
                    Some(_) => info!(set_id = %id, count, "entity set materialized"),
                    // Deleted while the job ran; drop the orphaned members
                    // instead of resurrecting the record.
                    None => {
                        self.store.delete(id);
                    }
                }
            }
            Ok(Err(e)) => {
                error!(set_id = %id, error = %e, "search failed during materialization");
                self.transition(
                    id,
                    SetState::Error {
                        reason: format!("search failed: {e}"),
                    },
                );
            }
            Err(_) => {
                error!(set_id = %id, timeout = ?self.limits.search_timeout, "search timed out");
                self.transition(
                    id,
                    SetState::Error {
                        reason: format!(
                            "search timed out after {:?}",
                            self.limits.search_timeout
                        ),
                    },
                );
            }
        }
    }

    async fn materialize_union(&self, id: SetId, definition: DerivedEntitySetDefinition) {
        if self.store.get(id).is_none() {
            error!(set_id = %id, "pending record disappeared before materialization");
            return;
        }

        let ids = compute_union(&definition.union_definitions, |set_id| {
            self.resolve_finished_members(*set_id)
        });

        if ids.len() > self.limits.max_set_size {
            info!(
                set_id = %id,
                count = ids.len(),
                max = self.limits.max_set_size,
                "union result exceeds the allowed maximum; aborting set operation"
            );
            self.transition(
                id,
                SetState::Error {
                    reason: format!(
                        "result cardinality {} exceeds the allowed maximum {}",
                        ids.len(),
                        self.limits.max_set_size
                    ),
                },
            );
            return;
        }

        let count = ids.len() as u64;
        self.store.put_members(id, ids);
        match self.transition(id, SetState::Finished { count }) {
            Some(_) => info!(set_id = %id, count, "derived entity set materialized"),
            None => {
                self.store.delete(id);
            }
        }
    }

    /// Apply a terminal state to the latest stored record, preserving any
    /// rename that landed while the job ran. `None` means the record was
    /// deleted mid-flight and nothing was written.
    fn transition(&self, id: SetId, state: SetState) -> Option<EntitySet> {
        let updated = self.store.update(id, |set| set.state = state);
        if updated.is_none() {
            warn!(set_id = %id, "set was deleted during materialization");
        }
        updated
    }

    async fn run_analysis(&self, id: AnalysisId, definition: DerivedEntitySetDefinition) {
        if self.analyses.get(id).is_none() {
            error!(analysis_id = %id, "pending analysis disappeared before execution");
            return;
        }

        let result: Vec<UnionUnitWithCount> = definition
            .union_definitions
            .iter()
            .map(|unit| UnionUnitWithCount {
                unit: unit.clone(),
                count: term_count(unit, |set_id| self.resolve_finished_members(*set_id)),
            })
            .collect();

        debug!(analysis_id = %id, units = result.len(), "union analysis finished");
        self.analyses
            .update(id, |analysis| {
                analysis.state = AnalysisState::Finished { result }
            });
    }

    /// Resolution used by the algebra: only a previously finished set has a
    /// member list to contribute.
    fn resolve_finished_members(&self, id: SetId) -> Option<Vec<String>> {
        let set = self.store.get(id)?;
        if !set.state.is_finished() {
            warn!(set_id = %id, state = ?set.state, "referenced set is not finished");
            return None;
        }
        self.store.get_members(id).map(|members| members.as_ref().clone())
    }

    /// Enqueue a materialization job for an already-persisted pending record.
    /// A rejected submission is recorded on the record, not thrown: the
    /// submitter already holds a 201 response by contract.
    fn dispatch<F>(
        &self,
        pending: EntitySet,
        name: &'static str,
        future: F,
    ) -> Result<EntitySet, ServiceError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        match self.runner.submit(name, future) {
            Ok(()) => Ok(pending),
            Err(e) => {
                error!(set_id = %pending.id, error = %e, "failed to enqueue materialization");
                let errored = self.transition(
                    pending.id,
                    SetState::Error {
                        reason: "job queue unavailable".into(),
                    },
                );
                Ok(errored.unwrap_or(pending))
            }
        }
    }
}
