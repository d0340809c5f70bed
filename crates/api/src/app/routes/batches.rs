use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use agroflow_agriculture::{
    make_additive_log, make_disease_diagnosis, make_plant, CreatePlantBatch, PlantBatch,
    PlantBatchCommand, PlantBatchId, ReschedulePlantBatch, ScheduleCultivation,
};
use agroflow_core::AggregateId;
use agroflow_infra::aggregate_types;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_batch).get(list_batches))
        .route("/:id", get(get_batch))
        .route("/:id/reschedule", post(reschedule_batch))
        .route("/:id/plants", post(make_plant_draft))
        .route("/:id/additive-logs", post(make_additive_log_draft))
        .route("/:id/disease-diagnoses", post(make_disease_diagnosis_draft))
}

pub async fn create_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateBatchRequest>,
) -> axum::response::Response {
    let batch_agg = AggregateId::new();
    let batch_id = PlantBatchId::new(batch_agg);
    let strain = body.strain.into_snapshot();
    let schedule_tasks = strain.has_task_template();
    let now = Utc::now();

    let cmd = PlantBatchCommand::CreatePlantBatch(CreatePlantBatch {
        tenant_id: tenant.tenant_id(),
        batch_id,
        title: body.title,
        strain,
        start_date: body.start_date,
        plant_spacing_uom: body.plant_spacing_uom,
        location: body.location,
        occurred_at: now,
    });

    let committed = match services.dispatcher.dispatch::<PlantBatch>(
        tenant.tenant_id(),
        batch_agg,
        aggregate_types::PLANT_BATCH,
        cmd,
        |_t, id| PlantBatch::empty(PlantBatchId::new(id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    // Creation hook: batches whose strain carries a task template get a
    // cultivation project scheduled right away.
    if schedule_tasks {
        let cmd = PlantBatchCommand::ScheduleCultivation(ScheduleCultivation {
            tenant_id: tenant.tenant_id(),
            batch_id,
            project_id: AggregateId::new(),
            occurred_at: Utc::now(),
        });
        if let Err(e) = services.dispatcher.dispatch::<PlantBatch>(
            tenant.tenant_id(),
            batch_agg,
            aggregate_types::PLANT_BATCH,
            cmd,
            |_t, id| PlantBatch::empty(PlantBatchId::new(id)),
        ) {
            return errors::dispatch_error_to_response(e);
        }
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": batch_agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn reschedule_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RescheduleBatchRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "batch id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let cmd = PlantBatchCommand::ReschedulePlantBatch(ReschedulePlantBatch {
        tenant_id: tenant.tenant_id(),
        batch_id: PlantBatchId::new(agg),
        start_date: body.start_date,
        occurred_at: Utc::now(),
    });

    match services.dispatcher.dispatch::<PlantBatch>(
        tenant.tenant_id(),
        agg,
        aggregate_types::PLANT_BATCH,
        cmd,
        |_t, id| PlantBatch::empty(PlantBatchId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": agg.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_batch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "batch id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .projections
        .batches
        .get(tenant.tenant_id(), &PlantBatchId::new(agg))
    {
        Some(rm) => (StatusCode::OK, Json(dto::batch_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "batch not found"),
    }
}

pub async fn list_batches(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .projections
        .batches
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::batch_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

pub async fn make_plant_draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    with_batch(&services, tenant, &id, |batch| {
        serde_json::json!(make_plant(batch))
    })
}

pub async fn make_additive_log_draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    with_batch(&services, tenant, &id, |batch| {
        serde_json::json!(make_additive_log(batch))
    })
}

pub async fn make_disease_diagnosis_draft(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    with_batch(&services, tenant, &id, |batch| {
        serde_json::json!(make_disease_diagnosis(batch))
    })
}

/// Load the batch aggregate and build a drafted document from it.
fn with_batch(
    services: &AppServices,
    tenant: TenantContext,
    id: &str,
    draft: impl FnOnce(&PlantBatch) -> serde_json::Value,
) -> axum::response::Response {
    let agg = match dto::parse_id(id, "batch id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.dispatcher.rehydrate::<PlantBatch>(
        tenant.tenant_id(),
        agg,
        |_t, aggregate_id| PlantBatch::empty(PlantBatchId::new(aggregate_id)),
    ) {
        Ok((_, 0)) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "batch not found"),
        Ok((batch, _version)) => {
            (StatusCode::CREATED, Json(draft(&batch))).into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
