use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{NaiveDate, Utc};
use std::sync::Arc;

use agroflow_contracts::{
    Contract, ContractCommand, ContractEvent, ContractId, ContractStatus, CreateContract,
    FulfilmentStatus, PartyType, RefreshStatus, StatusRefreshed,
};
use agroflow_core::{AggregateId, TenantId};
use agroflow_events::{EventEnvelope, InMemoryEventBus};
use agroflow_infra::aggregate_types;
use agroflow_infra::command_dispatcher::CommandDispatcher;
use agroflow_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use agroflow_infra::projections::{ContractReadModel, ContractsProjection};
use agroflow_infra::read_model::InMemoryTenantStore;

fn setup_dispatcher() -> (
    CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>,
    TenantId,
) {
    let store = InMemoryEventStore::new();
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
        Arc::new(InMemoryEventBus::new());
    (CommandDispatcher::new(store, bus), TenantId::new())
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
}

fn create_cmd(tenant_id: TenantId, contract_id: ContractId) -> ContractCommand {
    ContractCommand::CreateContract(CreateContract {
        tenant_id,
        contract_id,
        party_type: PartyType::Customer,
        party_name: "Rosewood Farms".to_string(),
        party_users: vec![],
        start_date: Some(day(1)),
        end_date: Some(day(30)),
        requires_fulfilment: false,
        fulfilment_deadline: None,
        fulfilment_requirements: vec![],
        contract_terms: "Agreement with {{ doc.party_name }}".to_string(),
        today: day(2),
        occurred_at: Utc::now(),
    })
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    // First command on a fresh stream (no history to replay).
    group.bench_function("create_contract_fresh", |b| {
        let (dispatcher, tenant_id) = setup_dispatcher();
        b.iter(|| {
            let contract_id = ContractId::new(AggregateId::new());
            dispatcher
                .dispatch::<Contract>(
                    tenant_id,
                    contract_id.0,
                    aggregate_types::CONTRACT,
                    black_box(create_cmd(tenant_id, contract_id)),
                    |_, id| Contract::empty(ContractId::new(id)),
                )
                .unwrap();
        });
    });

    // Full load + replay on an existing stream; an unchanged refresh
    // appends nothing, so the stream stays a fixed size.
    group.bench_function("refresh_status_with_history", |b| {
        let (dispatcher, tenant_id) = setup_dispatcher();
        let contract_id = ContractId::new(AggregateId::new());
        dispatcher
            .dispatch::<Contract>(
                tenant_id,
                contract_id.0,
                aggregate_types::CONTRACT,
                create_cmd(tenant_id, contract_id),
                |_, id| Contract::empty(ContractId::new(id)),
            )
            .unwrap();

        b.iter(|| {
            dispatcher
                .dispatch::<Contract>(
                    tenant_id,
                    contract_id.0,
                    aggregate_types::CONTRACT,
                    ContractCommand::RefreshStatus(RefreshStatus {
                        tenant_id,
                        contract_id,
                        today: black_box(day(2)),
                        occurred_at: Utc::now(),
                    }),
                    |_, id| Contract::empty(ContractId::new(id)),
                )
                .unwrap();
        });
    });

    group.finish();
}

fn refresh_event(tenant_id: TenantId, contract_id: ContractId, flip: bool) -> ContractEvent {
    ContractEvent::StatusRefreshed(StatusRefreshed {
        tenant_id,
        contract_id,
        status: if flip {
            ContractStatus::Active
        } else {
            ContractStatus::Inactive
        },
        fulfilment_status: Some(FulfilmentStatus::Unfulfilled),
        occurred_at: Utc::now(),
    })
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let tenant_id = TenantId::new();
                let contract_id = ContractId::new(AggregateId::new());

                b.iter(|| {
                    let events: Vec<UncommittedEvent> = (0..size)
                        .map(|i| {
                            UncommittedEvent::from_typed(
                                tenant_id,
                                contract_id.0,
                                aggregate_types::CONTRACT,
                                uuid::Uuid::now_v7(),
                                &refresh_event(tenant_id, contract_id, i % 2 == 0),
                            )
                            .unwrap()
                        })
                        .collect();

                    black_box(
                        store
                            .append(events, agroflow_core::ExpectedVersion::Any)
                            .unwrap(),
                    );
                });
            },
        );
    }

    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for event_count in [10, 100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("rebuild_from_events", event_count),
            event_count,
            |b, &count| {
                let (dispatcher, tenant_id) = setup_dispatcher();
                let contract_id = ContractId::new(AggregateId::new());

                let mut all_envelopes = Vec::new();
                let stored = dispatcher
                    .dispatch::<Contract>(
                        tenant_id,
                        contract_id.0,
                        aggregate_types::CONTRACT,
                        create_cmd(tenant_id, contract_id),
                        |_, id| Contract::empty(ContractId::new(id)),
                    )
                    .unwrap();
                all_envelopes.push(stored[0].to_envelope());

                let (store, _bus) = dispatcher.into_parts();
                for i in 0..(count - 1) {
                    let uncommitted = UncommittedEvent::from_typed(
                        tenant_id,
                        contract_id.0,
                        aggregate_types::CONTRACT,
                        uuid::Uuid::now_v7(),
                        &refresh_event(tenant_id, contract_id, i % 2 == 0),
                    )
                    .unwrap();
                    let stored = store
                        .append(
                            vec![uncommitted],
                            agroflow_core::ExpectedVersion::Exact((i + 1) as u64),
                        )
                        .unwrap();
                    all_envelopes.push(stored[0].to_envelope());
                }

                let read_model_store: Arc<InMemoryTenantStore<ContractId, ContractReadModel>> =
                    Arc::new(InMemoryTenantStore::new());
                let projection = ContractsProjection::new(read_model_store);

                b.iter(|| {
                    projection
                        .rebuild_from_scratch(black_box(all_envelopes.clone()))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_projection_rebuild_speed
);
criterion_main!(benches);
