#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use storefront_checkout::{
    client::StorefrontApiClient,
    config::AppConfig,
    entities::commerce::{LineData, Receiver, VariantKey},
    events::{Event, EventSender},
    services::{
        commerce::{CartStore, Navigator},
        ServiceFactory,
    },
    storage::FileCartStorage,
};
use rust_decimal_macros::dec;
use tempfile::TempDir;
use tokio::sync::broadcast;
use url::Url;
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

/// Navigator that remembers where it was sent instead of opening anything.
#[derive(Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<Url>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<Url> {
        self.visited.lock().expect("navigator lock").clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect(&self, url: &Url) {
        self.visited.lock().expect("navigator lock").push(url.clone());
    }
}

/// Helper harness wiring the services against a mock storefront API and a
/// cart file in a throwaway directory.
pub struct TestShop {
    pub server: MockServer,
    pub factory: ServiceFactory,
    pub navigator: Arc<RecordingNavigator>,
    pub cart_dir: TempDir,
}

impl TestShop {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Starts the mock server and lets the test adjust the config before the
    /// services are built.
    pub async fn with_config(customize: impl FnOnce(&mut AppConfig)) -> Self {
        let server = MockServer::start().await;
        let cart_dir = TempDir::new().expect("temp dir");

        let mut config = AppConfig::new(format!("{}/api/", server.uri()));
        config.cart_storage_path = cart_dir.path().join("cart.json");
        config.request_timeout_secs = 5;
        config.reconcile_redirect_delay_secs = 0;
        customize(&mut config);

        let api = Arc::new(StorefrontApiClient::from_config(&config).expect("api client"));
        let storage = Arc::new(FileCartStorage::new(config.cart_storage_path.clone()));
        let navigator = Arc::new(RecordingNavigator::default());
        let factory = ServiceFactory::new(
            Arc::new(config),
            api,
            storage,
            navigator.clone(),
            EventSender::new(64),
        );

        Self {
            server,
            factory,
            navigator,
            cart_dir,
        }
    }

    /// Loads the cart from disk, as a fresh process would.
    pub async fn cart(&self) -> Arc<CartStore> {
        self.factory.cart_store().await.expect("cart loads")
    }

    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.factory.event_sender().subscribe()
    }

    pub async fn mount_product(&self, product: Value) {
        let id = product["id"].as_str().expect("product id").to_string();
        Mock::given(method("GET"))
            .and(path("/api/catalog/variants"))
            .and(query_param("product", id.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(product))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_coupons(&self, coupons: Value) {
        Mock::given(method("GET"))
            .and(path("/api/coupons"))
            .respond_with(ResponseTemplate::new(200).set_body_json(coupons))
            .mount(&self.server)
            .await;
    }

    /// Answers order creation with `status` and `body`, exactly once.
    pub async fn mount_order_response(&self, status: u16, body: Value) {
        Mock::given(method("POST"))
            .and(path("/api/orders"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// Puts two `Basic Tee` in size M into the cart: subtotal 200000.
    pub async fn fill_cart(&self, cart: &CartStore) {
        cart.add("p1", VariantKey::new("M", None), tee_line(), 2)
            .await
            .expect("add to cart");
    }

    /// Every request the mock server saw for `path`.
    pub async fn requests_to(&self, request_path: &str) -> Vec<wiremock::Request> {
        self.server
            .received_requests()
            .await
            .expect("request recording enabled")
            .into_iter()
            .filter(|r| r.url.path() == request_path)
            .collect()
    }
}

pub fn tee_line() -> LineData {
    LineData {
        name: "Basic Tee".into(),
        unit_price: dec!(100000),
        image_ref: Some("tee.jpg".into()),
    }
}

pub fn receiver() -> Receiver {
    Receiver::new("Lan Nguyen", "0901234567", "12 Hang Bai, Hoan Kiem, Hanoi")
}

pub fn tee_product(stock_m: u32) -> Value {
    json!({
        "id": "p1",
        "name": "Basic Tee",
        "price": 100000,
        "image": "tee.jpg",
        "variants": [
            {"productId": "p1", "size": "M", "stock": stock_m},
            {"productId": "p1", "size": "L", "stock": 0}
        ]
    })
}

/// 10% off orders from 50000, capped at 15000, valid around now.
pub fn summer10() -> Value {
    json!({
        "code": "SUMMER10",
        "type": "percentage",
        "value": 10,
        "minOrderValue": 50000,
        "maxDiscountValue": 15000,
        "startDate": (Utc::now() - Duration::days(1)).to_rfc3339(),
        "endDate": (Utc::now() + Duration::days(30)).to_rfc3339(),
        "isActive": true
    })
}

pub fn order_body(id: &str, total: u64, payment_method: &str) -> Value {
    json!({
        "id": id,
        "totalAmount": total,
        "paymentMethod": payment_method,
        "status": "pending",
        "paymentStatus": "unpaid"
    })
}

/// Every event currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
