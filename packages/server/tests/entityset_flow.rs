//! End-to-end flows: submit definitions, poll to a terminal state, combine
//! sets, and export the result.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use portal_core::common::Filters;
use portal_core::domains::entityset::export::export_members;
use portal_core::domains::entityset::{
    DerivedEntitySetDefinition, EntitySet, EntitySetDefinition, EntitySetService, EntitySetStore,
    EntityType, SetId, SetOperationLimits, SetState, SortOrder, UnionAnalysisStore, UnionUnit,
};
use portal_core::kernel::{InMemorySearchService, JobRunner, JobRunnerConfig};

fn build_service(search: InMemorySearchService) -> Arc<EntitySetService> {
    Arc::new(EntitySetService::new(
        Arc::new(EntitySetStore::new()),
        Arc::new(UnionAnalysisStore::new()),
        Arc::new(search),
        Arc::new(JobRunner::start(JobRunnerConfig {
            workers: 2,
            ..Default::default()
        })),
        SetOperationLimits {
            max_set_size: 10_000,
            max_preview_size: 100,
            search_timeout: Duration::from_secs(5),
        },
    ))
}

fn donor_definition(name: &str) -> EntitySetDefinition {
    EntitySetDefinition {
        filters: Filters::None,
        sort_by: "id".into(),
        sort_order: SortOrder::Ascending,
        name: name.into(),
        description: Some("integration".into()),
        entity_type: EntityType::Donor,
        size: 0,
        is_transient: false,
    }
}

async fn poll_terminal(service: &Arc<EntitySetService>, id: SetId) -> EntitySet {
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    loop {
        let set = service.get(id).unwrap();
        if set.state.is_terminal() {
            return set;
        }
        assert!(
            std::time::Instant::now() < deadline,
            "set never reached a terminal state"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn async_submission_is_pending_then_finished_with_count() {
    let corpus: Vec<String> = (0..500).map(|i| format!("DO{i:04}")).collect();
    let service = build_service(InMemorySearchService::with_corpus(
        EntityType::Donor,
        corpus.clone(),
    ));

    let pending = service.create(donor_definition("donors"), true).await.unwrap();
    assert_eq!(pending.state, SetState::Pending);

    let terminal = poll_terminal(&service, pending.id).await;
    assert_eq!(
        terminal.state,
        SetState::Finished {
            count: corpus.len() as u64
        }
    );

    let members = service.store().get_members(terminal.id).unwrap();
    assert_eq!(members.len(), corpus.len());
}

#[tokio::test]
async fn derived_set_combines_and_exports_round_trip() {
    let service = build_service(InMemorySearchService::new());
    let store = service.store();

    let s1 = store.save(EntitySet::from_definition(&donor_definition("s1")).finished(3));
    store.put_members(s1.id, vec!["DO1".into(), "DO2".into(), "DO3".into()]);
    let s2 = store.save(EntitySet::from_definition(&donor_definition("s2")).finished(1));
    store.put_members(s2.id, vec!["DO2".into()]);

    // {DO1,DO2,DO3} \ {DO2} = {DO1,DO3}
    let definition = DerivedEntitySetDefinition {
        union_definitions: vec![UnionUnit::new(
            BTreeSet::from([s1.id]),
            BTreeSet::from([s2.id]),
        )],
        name: "difference".into(),
        description: None,
        entity_type: EntityType::Donor,
        is_transient: false,
    };

    let pending = service.combine(definition, true).await.unwrap();
    let terminal = poll_terminal(&service, pending.id).await;
    assert_eq!(terminal.state, SetState::Finished { count: 2 });

    // Exporting and re-ingesting yields the same member set.
    let members = service.members(&terminal).unwrap();
    let mut sink = Vec::new();
    export_members(&terminal, members.as_slice(), &HashMap::new(), &mut sink).unwrap();

    let reingested: HashSet<String> = String::from_utf8(sink)
        .unwrap()
        .lines()
        .map(|line| line.to_string())
        .collect();
    assert_eq!(
        reingested,
        HashSet::from(["DO1".to_string(), "DO3".to_string()])
    );
}

#[tokio::test]
async fn stale_reference_does_not_poison_the_union() {
    let service = build_service(InMemorySearchService::new());
    let store = service.store();

    let live = store.save(EntitySet::from_definition(&donor_definition("live")).finished(2));
    store.put_members(live.id, vec!["DO1".into(), "DO2".into()]);

    let definition = DerivedEntitySetDefinition {
        union_definitions: vec![
            UnionUnit::new(BTreeSet::from([SetId::new()]), BTreeSet::new()),
            UnionUnit::new(BTreeSet::from([live.id]), BTreeSet::new()),
        ],
        name: "partial".into(),
        description: None,
        entity_type: EntityType::Donor,
        is_transient: false,
    };

    let set = service.combine(definition, false).await.unwrap();
    assert_eq!(set.state, SetState::Finished { count: 2 });
}
