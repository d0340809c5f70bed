use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::{ActorContext, TenantContext};

pub async fn health() -> axum::response::Response {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))).into_response()
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "tenant_id": tenant.tenant_id().to_string(),
            "email": actor.email(),
        })),
    )
        .into_response()
}
