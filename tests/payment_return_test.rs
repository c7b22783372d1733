//! Integration tests for handling the customer's return from the payment
//! gateway, both with a shared signing secret and by polling the status
//! endpoint.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{drain, TestShop};
use serde_json::json;
use rust_decimal_macros::dec;
use storefront_checkout::{
    client::{PaymentGatewayApi, StorefrontApiClient},
    events::Event,
    services::commerce::{payment_gateway::sign, PaymentVerification},
};
use wiremock::{
    matchers::{method, path},
    Mock, ResponseTemplate,
};

const SECRET: &str = "shared-gateway-secret";

fn signed_query(pairs: &[(&str, &str)]) -> String {
    let params: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let signature = sign(&params, SECRET).expect("hmac accepts any key");

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .append_pair("signature", &signature)
        .finish()
}

async fn signed_shop() -> TestShop {
    TestShop::with_config(|config| {
        config.payment_gateway_secret = Some(SECRET.to_string());
        config.reconcile_redirect_delay_secs = 5;
    })
    .await
}

async fn mount_status(shop: &TestShop, order_id: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(format!("/api/payments/gateway/{}/status", order_id)))
        .respond_with(response)
        .mount(&shop.server)
        .await;
}

// ==================== Signed returns ====================

#[tokio::test]
async fn test_signed_success_is_verified_without_calling_the_server() {
    let shop = signed_shop().await;
    let mut events = shop.events();

    let query = signed_query(&[
        ("orderId", "ord_1"),
        ("resultCode", "0"),
        ("transId", "T123"),
        ("message", "Successful."),
    ]);
    let outcome = shop
        .factory
        .payment_gateway()
        .reconcile(&format!("https://shop.example.com/payment/return?{}", query))
        .await;

    assert_eq!(
        outcome.verification,
        PaymentVerification::Verified {
            order_id: "ord_1".into(),
            transaction_id: Some("T123".into()),
        }
    );
    assert_eq!(outcome.redirect_after, Duration::from_secs(5));
    assert!(shop
        .server
        .received_requests()
        .await
        .expect("request recording enabled")
        .is_empty());
    assert_eq!(
        drain(&mut events),
        vec![Event::PaymentReconciled {
            order_id: Some("ord_1".into()),
            status: "verified".into(),
        }]
    );
}

#[tokio::test]
async fn test_tampered_return_is_rejected() {
    let shop = signed_shop().await;

    let query = signed_query(&[("orderId", "ord_1"), ("resultCode", "1006")])
        .replace("resultCode=1006", "resultCode=0");
    let outcome = shop.factory.payment_gateway().reconcile(&query).await;

    assert_matches!(
        outcome.verification,
        PaymentVerification::Failed { order_id: Some(ref id), .. } if id == "ord_1"
    );
}

#[tokio::test]
async fn test_signed_processing_code_is_pending() {
    let shop = signed_shop().await;

    let query = signed_query(&[("orderId", "ord_7"), ("resultCode", "7000")]);
    let outcome = shop.factory.payment_gateway().reconcile(&query).await;

    assert_eq!(
        outcome.verification,
        PaymentVerification::Pending {
            order_id: "ord_7".into()
        }
    );
}

#[tokio::test]
async fn test_signed_decline_carries_gateway_message() {
    let shop = signed_shop().await;

    let query = signed_query(&[
        ("orderId", "ord_8"),
        ("resultCode", "1006"),
        ("message", "Transaction denied by user."),
    ]);
    let outcome = shop.factory.payment_gateway().reconcile(&query).await;

    assert_matches!(
        outcome.verification,
        PaymentVerification::Failed { ref reason, .. } if reason == "Transaction denied by user."
    );
}

#[tokio::test]
async fn test_return_without_order_id_fails() {
    let shop = signed_shop().await;

    let outcome = shop
        .factory
        .payment_gateway()
        .reconcile("resultCode=0&signature=abc")
        .await;

    assert_matches!(
        outcome.verification,
        PaymentVerification::Failed { order_id: None, .. }
    );
}

// ==================== Status polling ====================

#[tokio::test]
async fn test_unsigned_return_polls_status() {
    let shop = TestShop::new().await;
    mount_status(
        &shop,
        "ord_1",
        ResponseTemplate::new(200).set_body_json(json!({"status": "paid"})),
    )
    .await;

    // Whatever the query claims, the server decides.
    let outcome = shop
        .factory
        .payment_gateway()
        .reconcile("orderId=ord_1&resultCode=1006")
        .await;

    assert_eq!(
        outcome.verification,
        PaymentVerification::Verified {
            order_id: "ord_1".into(),
            transaction_id: None,
        }
    );
    assert_eq!(outcome.redirect_after, Duration::ZERO);
}

#[tokio::test]
async fn test_polled_failure_is_reported() {
    let shop = TestShop::new().await;
    mount_status(
        &shop,
        "ord_2",
        ResponseTemplate::new(200).set_body_json(json!({"status": "failed"})),
    )
    .await;

    let outcome = shop
        .factory
        .payment_gateway()
        .reconcile("orderId=ord_2&resultCode=0")
        .await;

    assert_matches!(outcome.verification, PaymentVerification::Failed { .. });
    assert!(!outcome.verification.is_verified());
}

#[tokio::test]
async fn test_status_endpoint_outage_reads_as_pending() {
    let shop = TestShop::new().await;
    mount_status(&shop, "ord_3", ResponseTemplate::new(503)).await;

    let outcome = shop
        .factory
        .payment_gateway()
        .reconcile("orderId=ord_3&resultCode=0")
        .await;

    assert_eq!(
        outcome.verification,
        PaymentVerification::Pending {
            order_id: "ord_3".into()
        }
    );
}

#[tokio::test]
async fn test_order_id_cannot_redirect_the_status_poll() {
    let shop = TestShop::new().await;
    mount_status(
        &shop,
        "ord_paid",
        ResponseTemplate::new(200).set_body_json(json!({"status": "paid"})),
    )
    .await;

    let outcome = shop
        .factory
        .payment_gateway()
        .reconcile("orderId=ord_paid%2Fstatus%3F&resultCode=0")
        .await;

    assert_matches!(
        outcome.verification,
        PaymentVerification::Failed { order_id: None, .. }
    );
    assert!(shop
        .server
        .received_requests()
        .await
        .expect("request recording enabled")
        .is_empty());
}

#[tokio::test]
async fn test_status_poll_encodes_the_order_id() {
    let shop = TestShop::new().await;
    mount_status(
        &shop,
        "ord_1",
        ResponseTemplate::new(200).set_body_json(json!({"status": "paid"})),
    )
    .await;

    let client = StorefrontApiClient::new(
        &format!("{}/api/", shop.server.uri()),
        Duration::from_secs(5),
    )
    .expect("client");

    // Percent-encoded in the path, the id names no existing order.
    let status = client.payment_status("ord_1/status?").await;

    assert!(status.is_err());
    let requests = shop
        .server
        .received_requests()
        .await
        .expect("request recording enabled");
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].url.path(),
        "/api/payments/gateway/ord_1%2Fstatus%3F/status"
    );
    assert_eq!(requests[0].url.query(), None);
}

#[tokio::test]
async fn test_signed_amount_is_checked_against_the_charge() {
    let shop = signed_shop().await;

    let query = signed_query(&[("orderId", "ord_9"), ("resultCode", "0"), ("amount", "5000")]);
    let gateway = shop.factory.payment_gateway();

    let underpaid = gateway.reconcile_expecting(&query, Some(dec!(205000))).await;
    assert_matches!(
        underpaid.verification,
        PaymentVerification::Failed { order_id: Some(ref id), .. } if id == "ord_9"
    );

    let exact = gateway.reconcile_expecting(&query, Some(dec!(5000))).await;
    assert!(exact.verification.is_verified());
}
