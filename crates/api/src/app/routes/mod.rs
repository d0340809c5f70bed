use axum::{
    routing::{get, post},
    Router,
};

pub mod batches;
pub mod contracts;
pub mod payments;
pub mod system;
pub mod trips;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/payments", post(payments::make_payment))
        .nest("/contracts", contracts::router())
        .nest("/batches", batches::router())
        .nest("/trips", trips::router())
}
