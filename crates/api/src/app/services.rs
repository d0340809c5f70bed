use std::sync::{Arc, Mutex};

use chrono::Utc;

use agroflow_core::TenantId;
use agroflow_delivery::DirectionsService;
use agroflow_events::{EventEnvelope, InMemoryEventBus};
use agroflow_infra::{
    command_dispatcher::CommandDispatcher,
    event_store::InMemoryEventStore,
    jobs::{
        invoice_lapsed_contracts, refresh_contract_statuses, sync_contract_invoice_status,
        Schedule, Scheduler, SchedulerConfig, SchedulerHandle,
    },
    mailer::RecordingMailer,
    maps::GoogleDirectionsClient,
    orders::InMemoryOrderDirectory,
    projections::ProjectionRouter,
    worker::{ProjectionWorker, WorkerHandle},
};

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub google_maps_api_key: Option<String>,
    /// Unloading time inserted between consecutive stop arrival estimates.
    pub stop_delay_minutes: i64,
    /// Recipients of the lapsed-contract invoice summary.
    pub contract_manager_emails: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let google_maps_api_key = std::env::var("GOOGLE_MAPS_API_KEY").ok();
        let stop_delay_minutes = std::env::var("STOP_DELAY_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let contract_manager_emails = std::env::var("CONTRACT_MANAGER_EMAILS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            bind_addr,
            google_maps_api_key,
            stop_delay_minutes,
            contract_manager_emails,
        }
    }
}

pub type InMemoryDispatcher = CommandDispatcher<
    Arc<InMemoryEventStore>,
    Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>,
>;

pub struct AppServices {
    pub dispatcher: Arc<InMemoryDispatcher>,
    pub event_store: Arc<InMemoryEventStore>,
    pub projections: Arc<ProjectionRouter>,
    pub directions: Arc<dyn DirectionsService>,
    pub mailer: Arc<RecordingMailer>,
    pub orders: Arc<InMemoryOrderDirectory>,
    pub stop_delay_minutes: i64,
    // Background handles; kept so the threads outlive the router.
    background: Mutex<Option<(WorkerHandle, SchedulerHandle)>>,
}

impl AppServices {
    /// Stop the projection worker and the job scheduler. Subsequent calls
    /// are no-ops.
    pub fn shutdown_background(&self) {
        if let Ok(mut guard) = self.background.lock() {
            if let Some((worker, scheduler)) = guard.take() {
                worker.shutdown();
                scheduler.shutdown();
            }
        }
    }
}

pub fn build_services(config: &AppConfig) -> AppServices {
    // In-memory infra wiring: store + bus + projections behind a worker.
    let store = Arc::new(InMemoryEventStore::new());
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
        Arc::new(InMemoryEventBus::new());

    let projections = Arc::new(ProjectionRouter::new());
    let worker = {
        let projections = projections.clone();
        ProjectionWorker::spawn("projections", bus.clone(), move |envelope| {
            projections.apply_envelope(&envelope)
        })
    };

    let dispatcher: Arc<InMemoryDispatcher> =
        Arc::new(CommandDispatcher::new(store.clone(), bus.clone()));

    let directions: Arc<dyn DirectionsService> =
        Arc::new(GoogleDirectionsClient::new(config.google_maps_api_key.clone()));
    let mailer = Arc::new(RecordingMailer::new());
    let orders = Arc::new(InMemoryOrderDirectory::new());

    let scheduler = spawn_scheduler(
        store.clone(),
        dispatcher.clone(),
        projections.clone(),
        orders.clone(),
        mailer.clone(),
        config.contract_manager_emails.clone(),
    );

    AppServices {
        dispatcher,
        event_store: store,
        projections,
        directions,
        mailer,
        orders,
        stop_delay_minutes: config.stop_delay_minutes,
        background: Mutex::new(Some((worker, scheduler))),
    }
}

/// Register the contract scheduler callbacks and start the loop.
///
/// Tenants are discovered from the event store on each pass; a tenant
/// exists here exactly when it has committed at least one event.
fn spawn_scheduler(
    store: Arc<InMemoryEventStore>,
    dispatcher: Arc<InMemoryDispatcher>,
    projections: Arc<ProjectionRouter>,
    orders: Arc<InMemoryOrderDirectory>,
    mailer: Arc<RecordingMailer>,
    manager_emails: Vec<String>,
) -> SchedulerHandle {
    let mut scheduler = Scheduler::new();

    {
        let store = store.clone();
        let dispatcher = dispatcher.clone();
        let projections = projections.clone();
        scheduler.register("contracts.refresh_status", Schedule::Daily, move || {
            let now = Utc::now();
            let today = now.date_naive();
            for tenant_id in known_tenants(&store)? {
                let refreshed = refresh_contract_statuses(
                    &dispatcher,
                    &projections.contracts,
                    tenant_id,
                    today,
                    now,
                )
                .map_err(|e| e.to_string())?;
                if refreshed > 0 {
                    tracing::info!(%tenant_id, refreshed, "contract statuses refreshed");
                }
            }
            Ok(())
        });
    }

    {
        let store = store.clone();
        let dispatcher = dispatcher.clone();
        let projections = projections.clone();
        scheduler.register("contracts.invoice_lapsed", Schedule::Daily, move || {
            let now = Utc::now();
            for tenant_id in known_tenants(&store)? {
                let invoiced = invoice_lapsed_contracts(
                    &dispatcher,
                    &projections.contracts,
                    &*orders,
                    &*mailer,
                    &manager_emails,
                    tenant_id,
                    now,
                )
                .map_err(|e| e.to_string())?;
                if invoiced > 0 {
                    tracing::info!(%tenant_id, invoiced, "lapsed contracts invoiced");
                }
            }
            Ok(())
        });
    }

    scheduler.register("contracts.sync_invoice_status", Schedule::Hourly, move || {
        let now = Utc::now();
        for tenant_id in known_tenants(&store)? {
            sync_contract_invoice_status(
                &dispatcher,
                &projections.contracts,
                &projections.invoices,
                tenant_id,
                now,
            )
            .map_err(|e| e.to_string())?;
        }
        Ok(())
    });

    scheduler.spawn(SchedulerConfig::default().with_name("contract-jobs"))
}

fn known_tenants(store: &InMemoryEventStore) -> Result<Vec<TenantId>, String> {
    let mut tenants: Vec<TenantId> = store
        .all_events()
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|e| e.tenant_id)
        .collect();
    tenants.sort_unstable_by_key(|t| t.to_string());
    tenants.dedup();
    Ok(tenants)
}
