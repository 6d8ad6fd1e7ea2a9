//! Value objects for entity sets and union analyses.
//!
//! Definitions are caller-owned and never mutated after validation.
//! `EntitySet` and `UnionAnalysisResult` are store-owned records whose
//! lifecycle is a closed sum type: a finished record always carries its
//! count, an errored record always carries its reason.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{Filters, Id, ServiceError};

/// Identifier of a persisted entity set.
pub type SetId = Id<EntitySet>;

/// Identifier of a union analysis.
pub type AnalysisId = Id<UnionAnalysisResult>;

// ============================================================================
// Enums
// ============================================================================

/// The kind of entity a set contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityType {
    Donor,
    Gene,
    Mutation,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Short name used in search queries.
    pub fn as_param(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

// ============================================================================
// Definitions
// ============================================================================

/// Definition of a set originated from a search query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySetDefinition {
    /// Forwarded verbatim to the search collaborator.
    #[serde(default)]
    pub filters: Filters,
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    /// User-requested cap on cardinality; zero or negative means unbounded.
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub is_transient: bool,
}

impl EntitySetDefinition {
    /// The limit actually sent to the search index: the server cap always
    /// applies, regardless of the requested size.
    pub fn effective_limit(&self, server_cap: usize) -> usize {
        let requested = if self.size <= 0 {
            usize::MAX
        } else {
            self.size as usize
        };
        requested.min(server_cap)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.sort_by.trim().is_empty() {
            return Err(ServiceError::InvalidDefinition(
                "'sortBy' must contain a valid field name".into(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(ServiceError::InvalidDefinition(
                "'name' must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// One term of a set-algebra expression: an intersection of named sets minus
/// an exclusion of other named sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionUnit {
    pub intersection: BTreeSet<SetId>,
    #[serde(default)]
    pub exclusions: BTreeSet<SetId>,
}

impl UnionUnit {
    pub fn new(intersection: BTreeSet<SetId>, exclusions: BTreeSet<SetId>) -> Self {
        Self {
            intersection,
            exclusions,
        }
    }

    /// A unit is valid when its intersection is non-empty and no identifier
    /// appears on both sides. A unit violating this must be rejected before
    /// execution, never silently resolved.
    pub fn is_valid(&self) -> bool {
        !self.intersection.is_empty() && self.intersection.is_disjoint(&self.exclusions)
    }
}

/// Definition of a set derived from existing sets.
///
/// The term order does not affect the result (the final combination is a
/// union) but is preserved for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedEntitySetDefinition {
    pub union_definitions: Vec<UnionUnit>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub is_transient: bool,
}

impl DerivedEntitySetDefinition {
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::InvalidDefinition(
                "'name' must not be empty".into(),
            ));
        }
        if self.union_definitions.is_empty() {
            return Err(ServiceError::InvalidDefinition(
                "'unionDefinitions' must contain at least one term".into(),
            ));
        }
        for (index, unit) in self.union_definitions.iter().enumerate() {
            if unit.intersection.is_empty() {
                return Err(ServiceError::InvalidDefinition(format!(
                    "term {index} has an empty intersection"
                )));
            }
            if !unit.is_valid() {
                return Err(ServiceError::InvalidDefinition(format!(
                    "term {index} lists the same set in both intersection and exclusions"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Records
// ============================================================================

/// Lifecycle of an entity set.
///
/// `Pending` is the initial state of every submission; `Finished` and
/// `Error` are terminal. A finished set always has a count, an errored set
/// always has a reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum SetState {
    Pending,
    Finished { count: u64 },
    Error { reason: String },
}

impl SetState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SetState::Pending)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, SetState::Finished { .. })
    }
}

/// A persisted, observable entity set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySet {
    pub id: SetId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(flatten)]
    pub state: SetState,
    /// Incremented by the store on every save.
    pub version: u32,
    pub created_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_transient: bool,
}

impl EntitySet {
    /// A brand-new pending set for a query-derived definition.
    pub fn from_definition(definition: &EntitySetDefinition) -> Self {
        Self::new_pending(
            definition.name.clone(),
            definition.description.clone(),
            definition.entity_type,
            definition.is_transient,
        )
    }

    /// A brand-new pending set for an algebra-derived definition.
    pub fn from_derived_definition(definition: &DerivedEntitySetDefinition) -> Self {
        Self::new_pending(
            definition.name.clone(),
            definition.description.clone(),
            definition.entity_type,
            definition.is_transient,
        )
    }

    fn new_pending(
        name: String,
        description: Option<String>,
        entity_type: EntityType,
        is_transient: bool,
    ) -> Self {
        Self {
            id: SetId::new(),
            name,
            description,
            entity_type,
            state: SetState::Pending,
            version: 1,
            created_timestamp: Utc::now(),
            is_transient,
        }
    }

    pub fn finished(mut self, count: u64) -> Self {
        self.state = SetState::Finished { count };
        self
    }

    pub fn errored(mut self, reason: impl Into<String>) -> Self {
        self.state = SetState::Error {
            reason: reason.into(),
        };
        self
    }
}

/// One union term together with the cardinality it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionUnitWithCount {
    #[serde(flatten)]
    pub unit: UnionUnit,
    pub count: u64,
}

/// Lifecycle of a union analysis; same shape as [`SetState`] but a finished
/// analysis carries its per-unit counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AnalysisState {
    Pending,
    Finished { result: Vec<UnionUnitWithCount> },
    Error { reason: String },
}

impl AnalysisState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnalysisState::Pending)
    }
}

/// The outcome of combining sets without persisting a new first-class set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnionAnalysisResult {
    pub id: AnalysisId,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(flatten)]
    pub state: AnalysisState,
    /// Number of union terms submitted, kept for auditability.
    pub input_count: usize,
    pub version: u32,
    pub timestamp: DateTime<Utc>,
}

impl UnionAnalysisResult {
    pub fn new_pending(entity_type: EntityType, input_count: usize) -> Self {
        Self {
            id: AnalysisId::new(),
            entity_type,
            state: AnalysisState::Pending,
            input_count,
            version: 1,
            timestamp: Utc::now(),
        }
    }

    pub fn finished(mut self, result: Vec<UnionUnitWithCount>) -> Self {
        self.state = AnalysisState::Finished { result };
        self
    }

    pub fn errored(mut self, reason: impl Into<String>) -> Self {
        self.state = AnalysisState::Error {
            reason: reason.into(),
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set_ids(n: usize) -> Vec<SetId> {
        (0..n).map(|_| SetId::new()).collect()
    }

    fn query_definition(sort_by: &str) -> EntitySetDefinition {
        EntitySetDefinition {
            filters: Filters::None,
            sort_by: sort_by.to_string(),
            sort_order: SortOrder::Descending,
            name: "brain donors".to_string(),
            description: None,
            entity_type: EntityType::Donor,
            size: 0,
            is_transient: false,
        }
    }

    #[test]
    fn test_empty_sort_by_fails_validation() {
        let definition = query_definition(" ");
        assert!(matches!(
            definition.validate(),
            Err(ServiceError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_effective_limit_applies_server_cap_both_ways() {
        let mut definition = query_definition("ssmAffectedGenes");

        // Unbounded request is clamped to the server cap.
        definition.size = 0;
        assert_eq!(definition.effective_limit(100), 100);
        definition.size = -5;
        assert_eq!(definition.effective_limit(100), 100);

        // A request larger than the cap is clamped; a smaller one wins.
        definition.size = 1000;
        assert_eq!(definition.effective_limit(100), 100);
        definition.size = 7;
        assert_eq!(definition.effective_limit(100), 7);
    }

    #[test]
    fn test_union_unit_rejects_overlap() {
        let ids = set_ids(2);
        let valid = UnionUnit::new(
            BTreeSet::from([ids[0]]),
            BTreeSet::from([ids[1]]),
        );
        assert!(valid.is_valid());

        let overlapping = UnionUnit::new(
            BTreeSet::from([ids[0], ids[1]]),
            BTreeSet::from([ids[1]]),
        );
        assert!(!overlapping.is_valid());

        let empty = UnionUnit::new(BTreeSet::new(), BTreeSet::new());
        assert!(!empty.is_valid());
    }

    #[test]
    fn test_derived_definition_rejects_invalid_units() {
        let ids = set_ids(2);
        let mut definition = DerivedEntitySetDefinition {
            union_definitions: vec![],
            name: "derived".to_string(),
            description: None,
            entity_type: EntityType::Gene,
            is_transient: false,
        };
        assert!(definition.validate().is_err());

        definition.union_definitions = vec![UnionUnit::new(
            BTreeSet::from([ids[0], ids[1]]),
            BTreeSet::from([ids[1]]),
        )];
        assert!(definition.validate().is_err());

        definition.union_definitions = vec![UnionUnit::new(BTreeSet::from([ids[0]]), BTreeSet::new())];
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn test_set_state_serializes_flat() {
        let set = EntitySet::from_definition(&query_definition("id")).finished(42);
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value["state"], json!("finished"));
        assert_eq!(value["count"], json!(42));
        assert_eq!(value["type"], json!("DONOR"));
        assert_eq!(value["version"], json!(1));
    }

    #[test]
    fn test_pending_set_has_no_count() {
        let set = EntitySet::from_definition(&query_definition("id"));
        let value = serde_json::to_value(&set).unwrap();
        assert_eq!(value["state"], json!("pending"));
        assert!(value.get("count").is_none());
    }

    #[test]
    fn test_definition_accepts_wire_shape() {
        let definition: EntitySetDefinition = serde_json::from_value(json!({
            "filters": {"gene": {"symbol": {"is": ["TP53"]}}},
            "sortBy": "affectedDonorCountFiltered",
            "sortOrder": "DESCENDING",
            "name": "TP53",
            "type": "GENE",
            "size": 100,
            "isTransient": true
        }))
        .unwrap();

        assert_eq!(definition.entity_type, EntityType::Gene);
        assert_eq!(definition.sort_order, SortOrder::Descending);
        assert!(definition.is_transient);
        assert!(!definition.filters.is_none());
    }

    #[test]
    fn test_derived_definition_wire_field_is_union_definitions() {
        let ids = set_ids(2);
        let definition: DerivedEntitySetDefinition = serde_json::from_value(json!({
            "unionDefinitions": [
                {"intersection": [ids[0]], "exclusions": [ids[1]]}
            ],
            "name": "derived",
            "type": "DONOR"
        }))
        .unwrap();
        assert_eq!(definition.union_definitions.len(), 1);

        let value = serde_json::to_value(&definition).unwrap();
        assert!(value.get("unionDefinitions").is_some());
        assert!(value.get("union").is_none());
    }
}
