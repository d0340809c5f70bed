use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;

use agroflow_delivery::{
    plan_route, ApplyRoutePlan, CancelTrip, CreateDeliveryTrip, DeliveryTrip, DeliveryTripCommand,
    DeliveryTripId, EndTrip, MarkCustomersNotified, MarkStopVisited, PauseTrip, ResumeTrip,
    StartTrip, StopInput, SubmitTrip,
};
use agroflow_core::AggregateId;
use agroflow_infra::aggregate_types;
use agroflow_infra::notifications::{notify_customers, DEFAULT_DISPATCH_TEMPLATE};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_trip).get(list_trips))
        .route("/:id", get(get_trip))
        .route("/:id/submit", post(submit_trip))
        .route("/:id/cancel", post(cancel_trip))
        .route("/:id/process-route", post(process_route))
        .route("/:id/stops/:idx/visit", post(visit_stop))
        .route("/:id/notify-customers", post(notify_trip_customers))
        .route("/:id/console", post(trip_console))
}

pub async fn create_trip(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateTripRequest>,
) -> axum::response::Response {
    let mut stops: Vec<StopInput> = Vec::with_capacity(body.stops.len());
    for stop in body.stops {
        match stop.into_stop_input() {
            Ok(s) => stops.push(s),
            Err(resp) => return resp,
        }
    }

    let trip_agg = AggregateId::new();
    let cmd = DeliveryTripCommand::CreateDeliveryTrip(CreateDeliveryTrip {
        tenant_id: tenant.tenant_id(),
        trip_id: DeliveryTripId::new(trip_agg),
        driver_name: body.driver_name,
        driver_email: body.driver_email,
        cell_number: body.cell_number,
        driver_address: body.driver_address,
        vehicle: body.vehicle,
        departure_time: body.departure_time,
        stops,
        occurred_at: Utc::now(),
    });

    match dispatch(&services, tenant, trip_agg, cmd) {
        Ok(committed) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": trip_agg.to_string(),
                "events_committed": committed,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

pub async fn submit_trip(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "trip id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = DeliveryTripCommand::SubmitTrip(SubmitTrip {
        tenant_id: tenant.tenant_id(),
        trip_id: DeliveryTripId::new(agg),
        occurred_at: Utc::now(),
    });
    dispatch_ok(&services, tenant, agg, cmd)
}

pub async fn cancel_trip(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "trip id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = DeliveryTripCommand::CancelTrip(CancelTrip {
        tenant_id: tenant.tenant_id(),
        trip_id: DeliveryTripId::new(agg),
        occurred_at: Utc::now(),
    });
    dispatch_ok(&services, tenant, agg, cmd)
}

#[derive(Debug, Deserialize, Default)]
pub struct ProcessRouteQuery {
    #[serde(default)]
    pub optimize: bool,
}

pub async fn process_route(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Query(query): Query<ProcessRouteQuery>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "trip id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let trip = match services.dispatcher.rehydrate::<DeliveryTrip>(
        tenant.tenant_id(),
        agg,
        |_t, aggregate_id| DeliveryTrip::empty(DeliveryTripId::new(aggregate_id)),
    ) {
        Ok((_, 0)) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "trip not found")
        }
        Ok((trip, _version)) => trip,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    let plan = match plan_route(
        &trip,
        services.directions.as_ref(),
        query.optimize,
        services.stop_delay_minutes,
    )
    .await
    {
        Ok(plan) => plan,
        Err(e) => return errors::route_plan_error_to_response(e),
    };

    let cmd = DeliveryTripCommand::ApplyRoutePlan(ApplyRoutePlan {
        tenant_id: tenant.tenant_id(),
        trip_id: DeliveryTripId::new(agg),
        plan: plan.clone(),
        occurred_at: Utc::now(),
    });
    match dispatch(&services, tenant, agg, cmd) {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": agg.to_string(),
                "stop_order": plan.stop_order,
                "total_distance_m": plan.total_distance_m,
                "stops": plan.stops,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

pub async fn visit_stop(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((id, idx)): Path<(String, usize)>,
    Json(body): Json<dto::VisitStopRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "trip id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let cmd = DeliveryTripCommand::MarkStopVisited(MarkStopVisited {
        tenant_id: tenant.tenant_id(),
        trip_id: DeliveryTripId::new(agg),
        stop_index: idx,
        paid_amount_cents: body.paid_amount_cents,
        occurred_at: Utc::now(),
    });
    dispatch_ok(&services, tenant, agg, cmd)
}

pub async fn notify_trip_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "trip id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let trip_id = DeliveryTripId::new(agg);

    let rm = match services.projections.trips.get(tenant.tenant_id(), &trip_id) {
        Some(rm) => rm,
        None => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "trip not found"),
    };

    let notifications = match notify_customers(
        tenant.tenant_id(),
        &rm,
        DEFAULT_DISPATCH_TEMPLATE,
        &services.mailer,
    ) {
        Ok(n) => n,
        Err(e) => return errors::json_error(StatusCode::BAD_GATEWAY, "mail_error", e.to_string()),
    };

    let notified: Vec<String> = notifications.iter().map(|n| n.email.clone()).collect();
    if !notifications.is_empty() {
        let cmd = DeliveryTripCommand::MarkCustomersNotified(MarkCustomersNotified {
            tenant_id: tenant.tenant_id(),
            trip_id,
            notifications,
            occurred_at: Utc::now(),
        });
        if let Err(resp) = dispatch(&services, tenant, agg, cmd) {
            return resp;
        }
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({ "id": agg.to_string(), "notified": notified })),
    )
        .into_response()
}

pub async fn trip_console(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ConsoleRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "trip id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let trip_id = DeliveryTripId::new(agg);
    let occurred_at = Utc::now();

    let cmd = match body.action.as_str() {
        "start" => match body.odometer_value {
            Some(odometer_value) => DeliveryTripCommand::StartTrip(StartTrip {
                tenant_id: tenant.tenant_id(),
                trip_id,
                odometer_value,
                occurred_at,
            }),
            None => return odometer_required(),
        },
        "pause" => DeliveryTripCommand::PauseTrip(PauseTrip {
            tenant_id: tenant.tenant_id(),
            trip_id,
            occurred_at,
        }),
        "continue" => DeliveryTripCommand::ResumeTrip(ResumeTrip {
            tenant_id: tenant.tenant_id(),
            trip_id,
            occurred_at,
        }),
        "end" => match body.odometer_value {
            Some(odometer_value) => DeliveryTripCommand::EndTrip(EndTrip {
                tenant_id: tenant.tenant_id(),
                trip_id,
                odometer_value,
                occurred_at,
            }),
            None => return odometer_required(),
        },
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_action",
                "action must be one of: start, pause, continue, end",
            )
        }
    };

    dispatch_ok(&services, tenant, agg, cmd)
}

pub async fn get_trip(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "trip id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .projections
        .trips
        .get(tenant.tenant_id(), &DeliveryTripId::new(agg))
    {
        Some(rm) => (StatusCode::OK, Json(dto::trip_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "trip not found"),
    }
}

pub async fn list_trips(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .projections
        .trips
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::trip_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

fn odometer_required() -> axum::response::Response {
    errors::json_error(
        StatusCode::BAD_REQUEST,
        "missing_odometer",
        "odometer_value is required for this action",
    )
}

fn dispatch(
    services: &AppServices,
    tenant: TenantContext,
    aggregate_id: AggregateId,
    cmd: DeliveryTripCommand,
) -> Result<usize, axum::response::Response> {
    services
        .dispatcher
        .dispatch::<DeliveryTrip>(
            tenant.tenant_id(),
            aggregate_id,
            aggregate_types::DELIVERY_TRIP,
            cmd,
            |_t, id| DeliveryTrip::empty(DeliveryTripId::new(id)),
        )
        .map(|committed| committed.len())
        .map_err(errors::dispatch_error_to_response)
}

fn dispatch_ok(
    services: &AppServices,
    tenant: TenantContext,
    aggregate_id: AggregateId,
    cmd: DeliveryTripCommand,
) -> axum::response::Response {
    match dispatch(services, tenant, aggregate_id, cmd) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": aggregate_id.to_string(),
                "events_committed": committed,
            })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}
