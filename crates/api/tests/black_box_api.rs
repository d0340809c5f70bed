use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use agroflow_api::app::{build_app_with_services, services, AppConfig, AppServices};
use agroflow_core::TenantId;
use agroflow_infra::maps::UniformDirections;

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = AppConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            google_maps_api_key: None,
            stop_delay_minutes: 5,
            contract_manager_emails: vec![],
        };
        let mut built = services::build_services(&config);
        // No outbound HTTP from tests: fixed distances and durations.
        built.directions = Arc::new(UniformDirections {
            leg_distance_m: 1_000,
            leg_duration_s: 600,
        });
        let built = Arc::new(built);

        let app = build_app_with_services(built.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services: built,
            handle,
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.services.shutdown_background();
        self.handle.abort();
    }
}

/// Poll a tenant-scoped GET until the projection catches up and the body
/// satisfies the predicate.
async fn get_eventually(
    client: &reqwest::Client,
    url: &str,
    tenant_id: TenantId,
    accept: impl Fn(&serde_json::Value) -> bool,
) -> serde_json::Value {
    for _ in 0..100 {
        let res = client
            .get(url)
            .header("x-tenant-id", tenant_id.to_string())
            .send()
            .await
            .unwrap();

        if res.status() == StatusCode::OK {
            let body: serde_json::Value = res.json().await.unwrap();
            if accept(&body) {
                return body;
            }
        }

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    panic!("projection did not catch up within timeout for {url}");
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;

    let res = reqwest::Client::new()
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_header_is_required_for_scoped_routes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let tenant_id = TenantId::new();
    let res = client
        .get(format!("{}/whoami", srv.base_url))
        .header("x-tenant-id", tenant_id.to_string())
        .header("x-user-email", "amira@rosewood.example")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert_eq!(body["email"], "amira@rosewood.example");
}

#[tokio::test]
async fn contract_lifecycle_create_sign_submit() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant_id = TenantId::new();

    let res = client
        .post(format!("{}/contracts", srv.base_url))
        .header("x-tenant-id", tenant_id.to_string())
        .json(&json!({
            "party_type": "customer",
            "party_name": "Rosewood Farms",
            "party_users": ["amira@rosewood.example"],
            "start_date": "2025-01-01",
            "end_date": "2035-12-31",
            "contract_terms": "Agreement with {{ doc.party_name }}",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    // Portal check: an actor who is not a party user may not sign.
    let res = client
        .post(format!("{}/contracts/{}/sign", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .header("x-user-email", "stranger@elsewhere.example")
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(format!("{}/contracts/{}/sign", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .header("x-user-email", "amira@rosewood.example")
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(format!("{}/contracts/{}/submit", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let contract = get_eventually(
        &client,
        &format!("{}/contracts/{}", srv.base_url, id),
        tenant_id,
        |c| c["is_signed"] == true && c["submitted"] == true,
    )
    .await;
    assert_eq!(contract["signee"], "amira@rosewood.example");
    assert_eq!(contract["status"], "active");
    assert!(contract["contract_display"]
        .as_str()
        .unwrap()
        .contains("Rosewood Farms"));
}

#[tokio::test]
async fn contract_share_mails_party_users() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant_id = TenantId::new();

    let res = client
        .post(format!("{}/contracts", srv.base_url))
        .header("x-tenant-id", tenant_id.to_string())
        .json(&json!({
            "party_type": "customer",
            "party_name": "Rosewood Farms",
            "party_users": ["amira@rosewood.example"],
            "contract_terms": "Agreement with {{ doc.party_name }}",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    get_eventually(
        &client,
        &format!("{}/contracts/{}", srv.base_url, id),
        tenant_id,
        |_| true,
    )
    .await;

    let res = client
        .post(format!("{}/contracts/{}/share", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let sent = srv.services.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["amira@rosewood.example".to_string()]);
    assert!(sent[0].body.contains("Rosewood Farms"));
}

#[tokio::test]
async fn batch_creation_schedules_cultivation_and_drafts_documents() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant_id = TenantId::new();

    let res = client
        .post(format!("{}/batches", srv.base_url))
        .header("x-tenant-id", tenant_id.to_string())
        .json(&json!({
            "title": "Spring basil",
            "strain": {
                "name": "Genovese",
                "period_days": 60,
                "plant_spacing_uom": "cm",
                "cultivation_tasks": [
                    { "subject": "Sow", "start_offset_days": 0, "duration_days": 2 },
                    { "subject": "Thin", "start_offset_days": 14, "duration_days": 1 }
                ]
            },
            "start_date": "2025-03-01",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let batch = get_eventually(
        &client,
        &format!("{}/batches/{}", srv.base_url, id),
        tenant_id,
        |b| !b["project"].is_null(),
    )
    .await;
    assert_eq!(batch["end_date"], "2025-04-30");
    assert_eq!(batch["plant_spacing_uom"], "cm");
    assert_eq!(batch["project"]["tasks"].as_array().unwrap().len(), 2);

    // Moving the start date moves the window and the project with it.
    let res = client
        .post(format!("{}/batches/{}/reschedule", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .json(&json!({ "start_date": "2025-04-01" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    get_eventually(
        &client,
        &format!("{}/batches/{}", srv.base_url, id),
        tenant_id,
        |b| b["start_date"] == "2025-04-01" && b["end_date"] == "2025-05-31",
    )
    .await;

    let res = client
        .post(format!("{}/batches/{}/plants", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let draft: serde_json::Value = res.json().await.unwrap();
    assert_eq!(draft["strain"], "Genovese");

    let res = client
        .post(format!("{}/batches/{}/additive-logs", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let draft: serde_json::Value = res.json().await.unwrap();
    assert_eq!(draft["batch_title"], "Spring basil");
}

#[tokio::test]
async fn trip_route_and_payment_flow() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant_id = TenantId::new();
    let invoice_id = uuid::Uuid::now_v7().to_string();

    let res = client
        .post(format!("{}/trips", srv.base_url))
        .header("x-tenant-id", tenant_id.to_string())
        .json(&json!({
            "driver_name": "Jesse",
            "driver_address": "12 Depot Lane<br>Dock 4<br>Carlow",
            "vehicle": "VAN-7",
            "departure_time": "2025-06-02T08:00:00Z",
            "stops": [
                {
                    "customer": "Rosewood Farms",
                    "address": "1 Orchard Way",
                    "contact_email": "amira@rosewood.example",
                    "sales_invoice": invoice_id,
                    "grand_total_cents": 2500
                },
                {
                    "customer": "Fern & Field",
                    "address": "9 Mill Road",
                    "grand_total_cents": 1200
                }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/trips/{}/submit", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Route processing: 2 stops means 3 uniform legs including homebound.
    let res = client
        .post(format!("{}/trips/{}/process-route", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let plan: serde_json::Value = res.json().await.unwrap();
    assert_eq!(plan["total_distance_m"], 3000);
    assert_eq!(plan["stop_order"], json!([0, 1]));

    // Wait until the projection has seen the submit before paying.
    get_eventually(
        &client,
        &format!("{}/trips/{}", srv.base_url, id),
        tenant_id,
        |t| t["status"] == "scheduled",
    )
    .await;

    let res = client
        .post(format!("{}/payments", srv.base_url))
        .header("x-tenant-id", tenant_id.to_string())
        .json(&json!({ "sales_invoice": invoice_id, "amount_cents": 2500 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let payment: serde_json::Value = res.json().await.unwrap();
    assert_eq!(payment["stops_marked"], 1);
    assert_eq!(payment["payment_entry"]["paid_amount_cents"], 2500);

    let trip = get_eventually(
        &client,
        &format!("{}/trips/{}", srv.base_url, id),
        tenant_id,
        |t| t["stops"][0]["visited"] == true,
    )
    .await;
    assert_eq!(trip["stops"][0]["paid_amount_cents"], 2500);
    assert_eq!(trip["status"], "in_transit");
}

#[tokio::test]
async fn trip_console_records_odometer_and_status() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant_id = TenantId::new();

    let res = client
        .post(format!("{}/trips", srv.base_url))
        .header("x-tenant-id", tenant_id.to_string())
        .json(&json!({
            "driver_name": "Jesse",
            "vehicle": "VAN-7",
            "departure_time": "2025-06-02T08:00:00Z",
            "stops": [
                { "customer": "Rosewood Farms", "address": "1 Orchard Way", "grand_total_cents": 2500 }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let res = client
        .post(format!("{}/trips/{}/submit", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    // Starting without an odometer reading is rejected.
    let res = client
        .post(format!("{}/trips/{}/console", srv.base_url, id))
        .header("x-tenant-id", tenant_id.to_string())
        .json(&json!({ "action": "start" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    for (action, odometer) in [
        ("start", Some(10_000)),
        ("pause", None),
        ("continue", None),
        ("end", Some(10_042)),
    ] {
        let mut body = json!({ "action": action });
        if let Some(v) = odometer {
            body["odometer_value"] = json!(v);
        }
        let res = client
            .post(format!("{}/trips/{}/console", srv.base_url, id))
            .header("x-tenant-id", tenant_id.to_string())
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK, "console action {action}");
    }

    let trip = get_eventually(
        &client,
        &format!("{}/trips/{}", srv.base_url, id),
        tenant_id,
        |t| t["status"] == "completed",
    )
    .await;
    assert_eq!(trip["odometer_start"], 10_000);
    assert_eq!(trip["odometer_end"], 10_042);
    assert_eq!(trip["actual_distance_m"], 42);
}

#[tokio::test]
async fn tenant_isolation_blocks_cross_tenant_reads_and_writes() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let tenant1 = TenantId::new();
    let tenant2 = TenantId::new();

    let res = client
        .post(format!("{}/contracts", srv.base_url))
        .header("x-tenant-id", tenant1.to_string())
        .json(&json!({
            "party_type": "customer",
            "party_name": "Rosewood Farms",
            "contract_terms": "Agreement",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    get_eventually(
        &client,
        &format!("{}/contracts/{}", srv.base_url, id),
        tenant1,
        |_| true,
    )
    .await;

    // Tenant2 can neither read nor act on tenant1's contract.
    let res = client
        .get(format!("{}/contracts/{}", srv.base_url, id))
        .header("x-tenant-id", tenant2.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(format!("{}/contracts/{}/submit", srv.base_url, id))
        .header("x-tenant-id", tenant2.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
