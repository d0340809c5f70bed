use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use agroflow_contracts::{
    Contract, ContractCommand, ContractId, CreateContract, FulfilTerm, PartyType, SignContract,
    SubmitContract,
};
use agroflow_core::AggregateId;
use agroflow_infra::aggregate_types;
use agroflow_infra::mailer::{EmailMessage, MailError, Mailer};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_contract).get(list_contracts))
        .route("/:id", get(get_contract))
        .route("/:id/sign", post(sign_contract))
        .route("/:id/terms/:idx/fulfil", post(fulfil_term))
        .route("/:id/submit", post(submit_contract))
        .route("/:id/share", post(share_contract))
}

pub async fn create_contract(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateContractRequest>,
) -> axum::response::Response {
    let party_type = match body.party_type.to_lowercase().as_str() {
        "customer" => PartyType::Customer,
        "supplier" => PartyType::Supplier,
        _ => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_party_type",
                "party_type must be customer or supplier",
            )
        }
    };

    let contract_agg = AggregateId::new();
    let contract_id = ContractId::new(contract_agg);
    let now = Utc::now();

    let cmd = ContractCommand::CreateContract(CreateContract {
        tenant_id: tenant.tenant_id(),
        contract_id,
        party_type,
        party_name: body.party_name,
        party_users: body.party_users,
        start_date: body.start_date,
        end_date: body.end_date,
        requires_fulfilment: body.requires_fulfilment,
        fulfilment_deadline: body.fulfilment_deadline,
        fulfilment_requirements: body.fulfilment_requirements,
        contract_terms: body.contract_terms,
        today: now.date_naive(),
        occurred_at: now,
    });

    let committed = match services.dispatcher.dispatch::<Contract>(
        tenant.tenant_id(),
        contract_agg,
        aggregate_types::CONTRACT,
        cmd,
        |_t, aggregate_id| Contract::empty(ContractId::new(aggregate_id)),
    ) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": contract_agg.to_string(),
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}

pub async fn sign_contract(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SignContractRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "contract id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let contract_id = ContractId::new(agg);

    let signee = match body.signee.or_else(|| actor.email().map(String::from)) {
        Some(s) => s,
        None => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "missing_signee",
                "a signee or x-user-email header is required",
            )
        }
    };

    // Portal check: an identified actor must be one of the party users.
    if let Some(email) = actor.email() {
        let contract = match services.dispatcher.rehydrate::<Contract>(
            tenant.tenant_id(),
            agg,
            |_t, aggregate_id| Contract::empty(ContractId::new(aggregate_id)),
        ) {
            Ok((_, 0)) => {
                return errors::json_error(StatusCode::NOT_FOUND, "not_found", "contract not found")
            }
            Ok((contract, _version)) => contract,
            Err(e) => return errors::dispatch_error_to_response(e),
        };
        if !contract.is_party_user(email) {
            return errors::json_error(
                StatusCode::FORBIDDEN,
                "not_party_user",
                "the acting user is not a party user of this contract",
            );
        }
    }

    let now = Utc::now();
    let cmd = ContractCommand::SignContract(SignContract {
        tenant_id: tenant.tenant_id(),
        contract_id,
        signee,
        today: now.date_naive(),
        occurred_at: now,
    });

    dispatch_ok(&services, tenant, agg, cmd)
}

pub async fn fulfil_term(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path((id, idx)): Path<(String, usize)>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "contract id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let now = Utc::now();
    let cmd = ContractCommand::FulfilTerm(FulfilTerm {
        tenant_id: tenant.tenant_id(),
        contract_id: ContractId::new(agg),
        term_index: idx,
        today: now.date_naive(),
        occurred_at: now,
    });

    dispatch_ok(&services, tenant, agg, cmd)
}

pub async fn submit_contract(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "contract id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let now = Utc::now();
    let cmd = ContractCommand::SubmitContract(SubmitContract {
        tenant_id: tenant.tenant_id(),
        contract_id: ContractId::new(agg),
        today: now.date_naive(),
        occurred_at: now,
    });

    dispatch_ok(&services, tenant, agg, cmd)
}

pub async fn share_contract(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ShareContractRequest>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "contract id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let contract_id = ContractId::new(agg);

    let rm = match services.projections.contracts.get(tenant.tenant_id(), &contract_id) {
        Some(rm) => rm,
        None => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "contract not found"),
    };

    let recipients = if body.recipients.is_empty() {
        rm.party_users.clone()
    } else {
        body.recipients
    };

    let message = EmailMessage {
        tenant_id: tenant.tenant_id(),
        to: recipients.clone(),
        subject: format!("Contract with {}", rm.party_name),
        body: rm.contract_display,
    };
    match services.mailer.send(message) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "id": agg.to_string(), "shared_with": recipients })),
        )
            .into_response(),
        Err(MailError::NoRecipients) => errors::json_error(
            StatusCode::BAD_REQUEST,
            "no_recipients",
            "the contract has no party users and no recipients were given",
        ),
        Err(e) => errors::json_error(StatusCode::BAD_GATEWAY, "mail_error", e.to_string()),
    }
}

pub async fn get_contract(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg = match dto::parse_id(&id, "contract id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services
        .projections
        .contracts
        .get(tenant.tenant_id(), &ContractId::new(agg))
    {
        Some(rm) => (StatusCode::OK, Json(dto::contract_to_json(rm))).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "contract not found"),
    }
}

pub async fn list_contracts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let items = services
        .projections
        .contracts
        .list(tenant.tenant_id())
        .into_iter()
        .map(dto::contract_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}

fn dispatch_ok(
    services: &AppServices,
    tenant: TenantContext,
    aggregate_id: AggregateId,
    cmd: ContractCommand,
) -> axum::response::Response {
    match services.dispatcher.dispatch::<Contract>(
        tenant.tenant_id(),
        aggregate_id,
        aggregate_types::CONTRACT,
        cmd,
        |_t, id| Contract::empty(ContractId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": aggregate_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
