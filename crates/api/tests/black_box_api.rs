use std::collections::HashSet;

use reqwest::StatusCode;
use serde_json::{json, Value};

use salonstock_infra::AppConfig;

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(config: AppConfig) -> Self {
        // Same router as prod, bound to an ephemeral port.
        let app = salonstock_api::app::build_app(&config)
            .await
            .expect("failed to build app");
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
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("X-Actor-Id", "u-1")
            .header("X-Actor-Role", "manager")
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Category `hair-care`, product `P1` and salons `Spa-A` / `Spa-B`.
async fn seed_catalog(srv: &TestServer) {
    let res = srv
        .post("/categories", json!({ "id": "hair-care", "name": "Hair care" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv
        .post(
            "/products",
            json!({
                "id": "P1",
                "name": "Argan Oil Serum",
                "category": "hair-care",
                "is_retail": true,
                "min_stock": 2,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    for (id, name) in [("Spa-A", "Spa A"), ("Spa-B", "Spa B")] {
        let res = srv.post("/locations", json!({ "id": id, "name": name })).await;
        assert_eq!(res.status(), StatusCode::CREATED);
    }
}

async fn adjust(srv: &TestServer, location: &str, kind: &str, quantity: i64) -> reqwest::Response {
    srv.post(
        "/inventory/adjust",
        json!({
            "product_id": "P1",
            "location_id": location,
            "adjustment_type": kind,
            "quantity": quantity,
            "reason": "stock count",
        }),
    )
    .await
}

fn stock_at(breakdown: &Value, location: &str) -> i64 {
    breakdown["locations"]
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["location_id"] == location)
        .map(|l| l["stock"].as_i64().unwrap())
        .unwrap_or(0)
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn(AppConfig::default()).await;
    assert_eq!(srv.get("/health").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn transfer_moves_stock_between_salons() {
    let srv = TestServer::spawn(AppConfig::default()).await;
    seed_catalog(&srv).await;

    let res = adjust(&srv, "Spa-A", "add", 10).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["new_stock"], 10);

    let res = srv
        .post(
            "/transfers",
            json!({
                "product_id": "P1",
                "from_location_id": "Spa-A",
                "to_location_id": "Spa-B",
                "quantity": 4,
                "reason": "restock",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let transfer: Value = res.json().await.unwrap();
    assert_eq!(transfer["status"], "completed");
    let transfer_id = transfer["transfer_id"].as_str().unwrap().to_string();
    assert_eq!(transfer["id"], transfer["transfer_id"]);

    let breakdown: Value = srv.get("/inventory/P1/stock").await.json().await.unwrap();
    assert_eq!(breakdown["total"], 10);
    assert_eq!(stock_at(&breakdown, "Spa-A"), 6);
    assert_eq!(stock_at(&breakdown, "Spa-B"), 4);

    let res = srv.get(&format!("/transfers/{transfer_id}")).await;
    assert_eq!(res.status(), StatusCode::OK);

    let audit: Value = srv.get("/inventory/P1/audit").await.json().await.unwrap();
    assert_eq!(audit["entries"].as_array().unwrap().len(), 3);

    let listed: Value = srv
        .get("/transfers?location_id=Spa-B&status=completed")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn removing_more_than_available_is_unprocessable() {
    let srv = TestServer::spawn(AppConfig::default()).await;
    seed_catalog(&srv).await;
    assert_eq!(adjust(&srv, "Spa-A", "add", 3).await.status(), StatusCode::OK);

    let res = adjust(&srv, "Spa-A", "remove", 5).await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["available"], 3);
    assert_eq!(body["requested"], 5);

    let breakdown: Value = srv.get("/inventory/P1/stock").await.json().await.unwrap();
    assert_eq!(stock_at(&breakdown, "Spa-A"), 3);
}

#[tokio::test]
async fn same_source_and_destination_is_a_bad_request() {
    let srv = TestServer::spawn(AppConfig::default()).await;
    seed_catalog(&srv).await;
    assert_eq!(adjust(&srv, "Spa-A", "add", 10).await.status(), StatusCode::OK);

    let res = srv
        .post(
            "/transfers",
            json!({
                "product_id": "P1",
                "from_location_id": "Spa-A",
                "to_location_id": "Spa-A",
                "quantity": 1,
                "reason": "restock",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_transfer");
}

#[tokio::test]
async fn stock_changes_require_a_known_actor() {
    let srv = TestServer::spawn(AppConfig::default()).await;
    seed_catalog(&srv).await;

    let res = srv
        .client
        .post(srv.url("/inventory/adjust"))
        .header("X-Actor-Id", "u-1")
        .header("X-Actor-Role", "janitor")
        .json(&json!({
            "product_id": "P1",
            "location_id": "Spa-A",
            "adjustment_type": "add",
            "quantity": 1,
            "reason": "count",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .post(srv.url("/inventory/adjust"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inactive_location_is_a_conflict() {
    let srv = TestServer::spawn(AppConfig::default()).await;
    seed_catalog(&srv).await;

    let res = srv
        .post("/locations/Spa-B/status", json!({ "status": "inactive" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = adjust(&srv, "Spa-B", "add", 1).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "inactive_resource");
}

#[tokio::test]
async fn locations_are_listed_once_per_name() {
    let srv = TestServer::spawn(AppConfig {
        seed_demo_data: true,
        ..AppConfig::default()
    })
    .await;

    let body: Value = srv.get("/locations").await.json().await.unwrap();
    let items = body["items"].as_array().unwrap();

    let names: Vec<String> = items
        .iter()
        .map(|l| l["name"].as_str().unwrap().to_lowercase())
        .collect();
    let unique: HashSet<_> = names.iter().collect();
    assert_eq!(names.len(), unique.len());
    assert!(items.iter().any(|l| l["id"] == "home"));
    assert!(!items.iter().any(|l| l["id"] == "home-legacy"));
}

#[tokio::test]
async fn inventory_report_and_low_stock() {
    let srv = TestServer::spawn(AppConfig::default()).await;
    seed_catalog(&srv).await;
    assert_eq!(adjust(&srv, "Spa-B", "add", 1).await.status(), StatusCode::OK);

    let all: Value = srv.get("/inventory?location=all").await.json().await.unwrap();
    assert_eq!(all["location"], "all");
    assert_eq!(all["items"][0]["stock"], 1);
    assert_eq!(all["items"][0]["low_stock"], true);

    let low: Value = srv.get("/inventory/low-stock?location=Spa-B").await.json().await.unwrap();
    assert_eq!(low["items"].as_array().unwrap().len(), 1);

    let res = srv.get("/inventory?location=Nowhere").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
