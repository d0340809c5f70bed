use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use agroflow_core::TenantId;

use crate::context::{ActorContext, TenantContext};

const TENANT_HEADER: &str = "x-tenant-id";
const ACTOR_HEADER: &str = "x-user-email";

/// Resolve the tenant (required) and actor (optional) from request headers.
pub async fn tenant_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let tenant_id = extract_tenant(req.headers())?;
    let actor = extract_actor(req.headers());

    req.extensions_mut().insert(TenantContext::new(tenant_id));
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}

fn extract_tenant(headers: &HeaderMap) -> Result<TenantId, StatusCode> {
    let header = headers
        .get(TENANT_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    header.parse().map_err(|_| StatusCode::UNAUTHORIZED)
}

fn extract_actor(headers: &HeaderMap) -> ActorContext {
    let email = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    ActorContext::new(email)
}
