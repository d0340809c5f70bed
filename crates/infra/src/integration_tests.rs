//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Command → EventStore → EventBus → Projection → ReadModel,
//! plus the scheduler jobs running on top of the read models.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{NaiveDate, Utc};

    use agroflow_contracts::{
        Contract, ContractCommand, ContractId, ContractStatus, CreateContract, FulfilmentStatus,
        PartyType, SubmitContract,
    };
    use agroflow_core::{AggregateId, TenantId};
    use agroflow_delivery::{
        ApplyRoutePlan, CreateDeliveryTrip, DeliveryTrip, DeliveryTripCommand, DeliveryTripId,
        MarkStopVisited, RoutePlan, StopEstimate, StopInput, SubmitTrip, TripStatus,
    };
    use agroflow_events::{EventEnvelope, InMemoryEventBus};
    use agroflow_invoicing::{InvoiceStatus, RegisterPayment, SalesInvoice, SalesInvoiceCommand, SalesInvoiceId};

    use crate::aggregate_types;
    use crate::command_dispatcher::{CommandDispatcher, DispatchError};
    use crate::event_store::InMemoryEventStore;
    use crate::jobs::{
        invoice_lapsed_contracts, refresh_contract_statuses, sync_contract_invoice_status,
    };
    use crate::mailer::RecordingMailer;
    use crate::orders::InMemoryOrderDirectory;
    use crate::projections::{DeliveryNoteStatus, ProjectionRouter};
    use crate::worker::{ProjectionWorker, WorkerHandle};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;
    type Dispatcher = CommandDispatcher<InMemoryEventStore, Bus>;

    fn setup() -> (Dispatcher, Arc<ProjectionRouter>, WorkerHandle) {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new(), bus.clone());
        let router = Arc::new(ProjectionRouter::new());

        let router_clone = router.clone();
        let worker = ProjectionWorker::spawn("test-projections", bus, move |env| {
            router_clone.apply_envelope(&env)
        });

        (dispatcher, router, worker)
    }

    /// The worker thread applies envelopes asynchronously.
    fn wait_for_processing() {
        std::thread::sleep(Duration::from_millis(100));
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_contract(
        dispatcher: &Dispatcher,
        tenant_id: TenantId,
        contract_id: ContractId,
        deadline: NaiveDate,
        today: NaiveDate,
    ) {
        dispatcher
            .dispatch::<Contract>(
                tenant_id,
                contract_id.0,
                aggregate_types::CONTRACT,
                ContractCommand::CreateContract(CreateContract {
                    tenant_id,
                    contract_id,
                    party_type: PartyType::Customer,
                    party_name: "Rosewood Farms".to_string(),
                    party_users: vec!["anna@rosewood.example".to_string()],
                    start_date: Some(date(2025, 1, 1)),
                    end_date: Some(date(2025, 12, 31)),
                    requires_fulfilment: true,
                    fulfilment_deadline: Some(deadline),
                    fulfilment_requirements: vec!["Deliver audit report".to_string()],
                    contract_terms: "Agreement with {{ doc.party_name }}".to_string(),
                    today,
                    occurred_at: Utc::now(),
                }),
                |_, id| Contract::empty(ContractId::new(id)),
            )
            .unwrap();

        dispatcher
            .dispatch::<Contract>(
                tenant_id,
                contract_id.0,
                aggregate_types::CONTRACT,
                ContractCommand::SubmitContract(SubmitContract {
                    tenant_id,
                    contract_id,
                    today,
                    occurred_at: Utc::now(),
                }),
                |_, id| Contract::empty(ContractId::new(id)),
            )
            .unwrap();
    }

    #[test]
    fn contract_commands_update_read_model() {
        let (dispatcher, router, worker) = setup();
        let tenant_id = TenantId::new();
        let contract_id = ContractId::new(AggregateId::new());

        create_contract(&dispatcher, tenant_id, contract_id, date(2025, 6, 30), date(2025, 3, 1));
        wait_for_processing();

        let rm = router.contracts.get(tenant_id, &contract_id).unwrap();
        assert!(rm.submitted);
        assert_eq!(rm.party_name, "Rosewood Farms");
        assert_eq!(rm.status, ContractStatus::Unsigned);
        assert_eq!(rm.fulfilment_status, Some(FulfilmentStatus::Unfulfilled));
        assert!(rm.contract_display.contains("Rosewood Farms"));

        worker.shutdown();
    }

    #[test]
    fn refresh_job_marks_overdue_contracts_lapsed() {
        let (dispatcher, router, worker) = setup();
        let tenant_id = TenantId::new();
        let contract_id = ContractId::new(AggregateId::new());

        create_contract(&dispatcher, tenant_id, contract_id, date(2025, 6, 30), date(2025, 3, 1));
        wait_for_processing();

        // Deadline has passed by the time the daily job runs.
        let refreshed = refresh_contract_statuses(
            &dispatcher,
            &router.contracts,
            tenant_id,
            date(2025, 7, 15),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(refreshed, 1);
        wait_for_processing();

        let rm = router.contracts.get(tenant_id, &contract_id).unwrap();
        assert_eq!(rm.fulfilment_status, Some(FulfilmentStatus::Lapsed));

        // Second run: nothing changed, nothing committed.
        let refreshed = refresh_contract_statuses(
            &dispatcher,
            &router.contracts,
            tenant_id,
            date(2025, 7, 15),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(refreshed, 0);

        worker.shutdown();
    }

    #[test]
    fn lapse_invoicing_bills_discounted_orders_and_links_invoice() {
        let (dispatcher, router, worker) = setup();
        let tenant_id = TenantId::new();
        let contract_id = ContractId::new(AggregateId::new());

        create_contract(&dispatcher, tenant_id, contract_id, date(2025, 6, 30), date(2025, 3, 1));
        wait_for_processing();

        refresh_contract_statuses(
            &dispatcher,
            &router.contracts,
            tenant_id,
            date(2025, 7, 15),
            Utc::now(),
        )
        .unwrap();
        wait_for_processing();

        let orders = InMemoryOrderDirectory::new();
        orders.record(tenant_id, "Rosewood Farms", "SO-0001", 2500, date(2025, 2, 10));
        orders.record(tenant_id, "Rosewood Farms", "SO-0002", 0, date(2025, 3, 5));
        // Outside the contract window, must not be billed.
        orders.record(tenant_id, "Rosewood Farms", "SO-0003", 9900, date(2025, 8, 1));

        let mailer = RecordingMailer::new();
        let invoiced = invoice_lapsed_contracts(
            &dispatcher,
            &router.contracts,
            &orders,
            &mailer,
            &["managers@agroflow.example".to_string()],
            tenant_id,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(invoiced, 1);
        wait_for_processing();

        let contract = router.contracts.get(tenant_id, &contract_id).unwrap();
        let invoice_id = contract.sales_invoice.expect("invoice linked to contract");

        let invoice = router
            .invoices
            .get(tenant_id, &SalesInvoiceId::new(invoice_id))
            .unwrap();
        assert_eq!(invoice.total_cents, 2500);
        assert_eq!(invoice.customer, "Rosewood Farms");
        assert_eq!(invoice.contract, Some(contract_id.0));

        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body.contains("Rosewood Farms"));

        // Second run: invoice already linked, nothing new.
        let invoiced = invoice_lapsed_contracts(
            &dispatcher,
            &router.contracts,
            &orders,
            &mailer,
            &[],
            tenant_id,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(invoiced, 0);

        worker.shutdown();
    }

    #[test]
    fn invoice_status_sync_mirrors_paid_status() {
        let (dispatcher, router, worker) = setup();
        let tenant_id = TenantId::new();
        let contract_id = ContractId::new(AggregateId::new());

        create_contract(&dispatcher, tenant_id, contract_id, date(2025, 6, 30), date(2025, 3, 1));
        wait_for_processing();
        refresh_contract_statuses(&dispatcher, &router.contracts, tenant_id, date(2025, 7, 15), Utc::now())
            .unwrap();
        wait_for_processing();

        let orders = InMemoryOrderDirectory::new();
        orders.record(tenant_id, "Rosewood Farms", "SO-0001", 2500, date(2025, 2, 10));
        let mailer = RecordingMailer::new();
        invoice_lapsed_contracts(&dispatcher, &router.contracts, &orders, &mailer, &[], tenant_id, Utc::now())
            .unwrap();
        wait_for_processing();

        let invoice_id = SalesInvoiceId::new(
            router
                .contracts
                .get(tenant_id, &contract_id)
                .unwrap()
                .sales_invoice
                .unwrap(),
        );

        // First sync writes "open".
        let synced = sync_contract_invoice_status(&dispatcher, &router.contracts, &router.invoices, tenant_id, Utc::now())
            .unwrap();
        assert_eq!(synced, 1);
        wait_for_processing();

        // Pay the invoice in full.
        dispatcher
            .dispatch::<SalesInvoice>(
                tenant_id,
                invoice_id.0,
                aggregate_types::SALES_INVOICE,
                SalesInvoiceCommand::RegisterPayment(RegisterPayment {
                    tenant_id,
                    invoice_id,
                    amount_cents: 2500,
                    occurred_at: Utc::now(),
                }),
                |_, id| SalesInvoice::empty(SalesInvoiceId::new(id)),
            )
            .unwrap();
        wait_for_processing();

        assert_eq!(
            router.invoices.get(tenant_id, &invoice_id).unwrap().status,
            InvoiceStatus::Paid
        );

        let synced = sync_contract_invoice_status(&dispatcher, &router.contracts, &router.invoices, tenant_id, Utc::now())
            .unwrap();
        assert_eq!(synced, 1);
        wait_for_processing();

        let rm = router.contracts.get(tenant_id, &contract_id).unwrap();
        assert_eq!(rm.sales_invoice_status.as_deref(), Some("paid"));

        // Unchanged: write-on-change means no further commits.
        let synced = sync_contract_invoice_status(&dispatcher, &router.contracts, &router.invoices, tenant_id, Utc::now())
            .unwrap();
        assert_eq!(synced, 0);

        worker.shutdown();
    }

    #[test]
    fn trip_submission_assigns_notes_and_payment_completes_stops() {
        let (dispatcher, router, worker) = setup();
        let tenant_id = TenantId::new();
        let trip_id = DeliveryTripId::new(AggregateId::new());
        let note = AggregateId::new();
        let invoice = AggregateId::new();

        dispatcher
            .dispatch::<DeliveryTrip>(
                tenant_id,
                trip_id.0,
                aggregate_types::DELIVERY_TRIP,
                DeliveryTripCommand::CreateDeliveryTrip(CreateDeliveryTrip {
                    tenant_id,
                    trip_id,
                    driver_name: "Lena Ortiz".to_string(),
                    driver_email: Some("lena@agroflow.example".to_string()),
                    cell_number: None,
                    driver_address: Some("Depot Road 7".to_string()),
                    vehicle: "VAN-02".to_string(),
                    departure_time: Utc::now(),
                    stops: vec![StopInput {
                        customer: "Rosewood Farms".to_string(),
                        address: "Orchard Lane 3".to_string(),
                        contact_email: Some("anna@rosewood.example".to_string()),
                        delivery_note: Some(note),
                        sales_invoice: Some(invoice),
                        grand_total_cents: 4200,
                        lock: false,
                    }],
                    occurred_at: Utc::now(),
                }),
                |_, id| DeliveryTrip::empty(DeliveryTripId::new(id)),
            )
            .unwrap();

        dispatcher
            .dispatch::<DeliveryTrip>(
                tenant_id,
                trip_id.0,
                aggregate_types::DELIVERY_TRIP,
                DeliveryTripCommand::SubmitTrip(SubmitTrip {
                    tenant_id,
                    trip_id,
                    occurred_at: Utc::now(),
                }),
                |_, id| DeliveryTrip::empty(DeliveryTripId::new(id)),
            )
            .unwrap();
        wait_for_processing();

        let assignment = router.trips.note_assignment(tenant_id, &note).unwrap();
        assert_eq!(assignment.trip_id, trip_id);
        assert_eq!(assignment.driver_name, "Lena Ortiz");
        assert_eq!(assignment.status, DeliveryNoteStatus::ToDeliver);

        // A payment against the invoice marks the matching stop visited.
        let hits = router.trips.unvisited_stops_for_invoice(tenant_id, invoice);
        assert_eq!(hits, vec![(trip_id, 0)]);

        for (hit_trip, stop_index) in hits {
            dispatcher
                .dispatch::<DeliveryTrip>(
                    tenant_id,
                    hit_trip.0,
                    aggregate_types::DELIVERY_TRIP,
                    DeliveryTripCommand::MarkStopVisited(MarkStopVisited {
                        tenant_id,
                        trip_id: hit_trip,
                        stop_index,
                        paid_amount_cents: Some(4200),
                        occurred_at: Utc::now(),
                    }),
                    |_, id| DeliveryTrip::empty(DeliveryTripId::new(id)),
                )
                .unwrap();
        }
        wait_for_processing();

        let rm = router.trips.get(tenant_id, &trip_id).unwrap();
        assert_eq!(rm.status, TripStatus::Completed);
        assert!(rm.stops[0].visited);
        assert_eq!(rm.stops[0].paid_amount_cents, Some(4200));

        let assignment = router.trips.note_assignment(tenant_id, &note).unwrap();
        assert_eq!(assignment.status, DeliveryNoteStatus::Completed);
        assert!(router.trips.unvisited_stops_for_invoice(tenant_id, invoice).is_empty());

        worker.shutdown();
    }

    #[test]
    fn route_plan_reorders_stops_and_carries_estimates_into_read_model() {
        let (dispatcher, router, worker) = setup();
        let tenant_id = TenantId::new();
        let trip_id = DeliveryTripId::new(AggregateId::new());

        let stop = |customer: &str| StopInput {
            customer: customer.to_string(),
            address: format!("{customer} street 1"),
            contact_email: None,
            delivery_note: None,
            sales_invoice: None,
            grand_total_cents: 0,
            lock: false,
        };

        dispatcher
            .dispatch::<DeliveryTrip>(
                tenant_id,
                trip_id.0,
                aggregate_types::DELIVERY_TRIP,
                DeliveryTripCommand::CreateDeliveryTrip(CreateDeliveryTrip {
                    tenant_id,
                    trip_id,
                    driver_name: "Lena Ortiz".to_string(),
                    driver_email: None,
                    cell_number: None,
                    driver_address: Some("Depot Road 7".to_string()),
                    vehicle: "VAN-02".to_string(),
                    departure_time: Utc::now(),
                    stops: vec![stop("Alder"), stop("Birch")],
                    occurred_at: Utc::now(),
                }),
                |_, id| DeliveryTrip::empty(DeliveryTripId::new(id)),
            )
            .unwrap();
        dispatcher
            .dispatch::<DeliveryTrip>(
                tenant_id,
                trip_id.0,
                aggregate_types::DELIVERY_TRIP,
                DeliveryTripCommand::SubmitTrip(SubmitTrip {
                    tenant_id,
                    trip_id,
                    occurred_at: Utc::now(),
                }),
                |_, id| DeliveryTrip::empty(DeliveryTripId::new(id)),
            )
            .unwrap();

        let eta = Utc::now();
        dispatcher
            .dispatch::<DeliveryTrip>(
                tenant_id,
                trip_id.0,
                aggregate_types::DELIVERY_TRIP,
                DeliveryTripCommand::ApplyRoutePlan(ApplyRoutePlan {
                    tenant_id,
                    trip_id,
                    plan: RoutePlan {
                        stop_order: vec![1, 0],
                        stops: vec![
                            StopEstimate {
                                estimated_arrival: Some(eta),
                                distance_m: 4_000,
                                lat: 52.1,
                                lng: 5.3,
                            },
                            StopEstimate {
                                estimated_arrival: Some(eta),
                                distance_m: 2_500,
                                lat: 52.2,
                                lng: 5.4,
                            },
                        ],
                        total_distance_m: 9_000,
                    },
                    occurred_at: Utc::now(),
                }),
                |_, id| DeliveryTrip::empty(DeliveryTripId::new(id)),
            )
            .unwrap();
        wait_for_processing();

        let rm = router.trips.get(tenant_id, &trip_id).unwrap();
        assert_eq!(rm.total_distance_m, Some(9_000));
        assert_eq!(rm.stops[0].customer, "Birch");
        assert_eq!(rm.stops[0].distance_m, Some(4_000));
        assert_eq!(rm.stops[0].lat, Some(52.1));
        assert_eq!(rm.stops[0].lng, Some(5.3));
        assert_eq!(rm.stops[0].estimated_arrival, Some(eta));
        assert_eq!(rm.stops[1].customer, "Alder");
        assert_eq!(rm.stops[1].distance_m, Some(2_500));

        worker.shutdown();
    }

    #[test]
    fn tenant_isolation_hides_other_tenants_read_models() {
        let (dispatcher, router, worker) = setup();
        let tenant_a = TenantId::new();
        let tenant_b = TenantId::new();
        let contract_id = ContractId::new(AggregateId::new());

        create_contract(&dispatcher, tenant_a, contract_id, date(2025, 6, 30), date(2025, 3, 1));
        wait_for_processing();

        assert!(router.contracts.get(tenant_a, &contract_id).is_some());
        assert!(router.contracts.get(tenant_b, &contract_id).is_none());
        assert!(router.contracts.list(tenant_b).is_empty());

        worker.shutdown();
    }

    #[test]
    fn concurrent_stale_append_is_rejected() {
        let (dispatcher, _router, worker) = setup();
        let tenant_id = TenantId::new();
        let contract_id = ContractId::new(AggregateId::new());

        create_contract(&dispatcher, tenant_id, contract_id, date(2025, 6, 30), date(2025, 3, 1));

        // Re-creating the same aggregate is a domain conflict surfaced as
        // a concurrency-class error.
        let err = dispatcher
            .dispatch::<Contract>(
                tenant_id,
                contract_id.0,
                aggregate_types::CONTRACT,
                ContractCommand::CreateContract(CreateContract {
                    tenant_id,
                    contract_id,
                    party_type: PartyType::Customer,
                    party_name: "Rosewood Farms".to_string(),
                    party_users: vec![],
                    start_date: None,
                    end_date: None,
                    requires_fulfilment: false,
                    fulfilment_deadline: None,
                    fulfilment_requirements: vec![],
                    contract_terms: String::new(),
                    today: date(2025, 3, 1),
                    occurred_at: Utc::now(),
                }),
                |_, id| Contract::empty(ContractId::new(id)),
            )
            .unwrap_err();

        assert!(matches!(err, DispatchError::Concurrency(_)));
        // The rendered message is what jobs and handlers log.
        assert!(err.to_string().contains("concurrency check failed"));

        worker.shutdown();
    }
}
