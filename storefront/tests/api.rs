//! HTTP API tests against the in-memory store
//!
//! Drives the full router (middleware included) with `oneshot`; the payment
//! gateway and invoice bucket are local fakes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use shared::error::AppError;
use shared::models::Product;
use storefront::auth::admin_auth::create_token;
use storefront::auth::{MemoryThrottle, RateLimiter};
use storefront::error::BoxError;
use storefront::invoice::InvoiceStorage;
use storefront::notify::{Dispatcher, Recipient};
use storefront::orders::pricing::PricingRules;
use storefront::orders::{OrderWorkflow, WorkflowSettings};
use storefront::payment::signature::sign;
use storefront::payment::{GatewayIntent, PaymentGateway};
use storefront::state::{ApiSecrets, AppState};
use storefront::store::MemoryStore;
use tokio::sync::Notify;
use tower::ServiceExt;

const KEY_SECRET: &str = "key-secret";
const WEBHOOK_SECRET: &str = "webhook-secret";
const CRON_SECRET: &str = "cron-secret";
const JWT_SECRET: &str = "jwt-secret";

struct StubGateway {
    calls: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn key_id(&self) -> &str {
        "rzp_test_stub"
    }

    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        _receipt: &str,
    ) -> Result<GatewayIntent, AppError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayIntent {
            gateway_order_id: format!("order_stub_{n}"),
            amount,
            currency: currency.to_string(),
        })
    }
}

struct StubInvoices;

#[async_trait]
impl InvoiceStorage for StubInvoices {
    async fn put(&self, key: &str, _body: String) -> Result<String, BoxError> {
        Ok(format!("https://invoices.test/{key}"))
    }
}

fn product(id: &str, price: i64, stock: i32) -> Product {
    Product {
        id: id.into(),
        name: format!("Catch {id}"),
        unit: "1 kg".into(),
        price,
        stock,
        default_stock: 8,
        in_stock: stock > 0,
        is_active: true,
        updated_at: 0,
    }
}

fn app(products: Vec<Product>) -> Router {
    let signal = Arc::new(Notify::new());
    let workflow = OrderWorkflow::new(
        Arc::new(MemoryStore::with_products(products)),
        Arc::new(StubGateway {
            calls: AtomicUsize::new(0),
        }),
        Arc::new(StubInvoices),
        signal.clone(),
        WorkflowSettings {
            pricing: PricingRules {
                delivery_fee: 4_900,
                free_delivery_threshold: 99_900,
            },
            currency: "INR".into(),
            payment_secret: KEY_SECRET.into(),
            abandon_after_minutes: 30,
        },
    );
    let state = AppState::from_parts(
        Arc::new(workflow),
        Arc::new(Dispatcher::new(vec![], Recipient::default())),
        signal,
        RateLimiter::new(Arc::new(MemoryThrottle::new())),
        ApiSecrets {
            webhook_secret: WEBHOOK_SECRET.into(),
            cron_secret: CRON_SECRET.into(),
            admin_jwt_secret: JWT_SECRET.into(),
        },
    );
    storefront::api::create_router(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "203.0.113.7")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn checkout_body(product_id: &str, quantity: i32, subtotal: i64, delivery_fee: i64) -> Value {
    json!({
        "phone": "9876543210",
        "name": "Meera",
        "address": "7 Fort Road",
        "city": "Kochi",
        "pincode": "682001",
        "items": [{ "productId": product_id, "quantity": quantity, "priceAtOrder": 0 }],
        "subtotal": subtotal,
        "deliveryFee": delivery_fee,
        "total": subtotal + delivery_fee,
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let app = app(vec![]);
    let (status, body) = send(
        &app,
        Request::get("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn checkout_pay_and_inspect() {
    let app = app(vec![product("kingfish", 45_000, 3)]);

    let (status, created) = send(&app, post_json("/orders", &checkout_body("kingfish", 2, 90_000, 4_900))).await;
    assert_eq!(status, StatusCode::OK, "{created}");
    let order_id = created["orderId"].as_str().unwrap().to_string();

    let (status, init) = send(
        &app,
        post_json(
            "/payment/create-order",
            &json!({ "orderId": order_id, "paymentInitToken": created["paymentInitToken"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{init}");
    assert_eq!(init["amount"], 94_900);
    assert_eq!(init["currency"], "INR");
    assert_eq!(init["keyId"], "rzp_test_stub");

    let gateway_order_id = init["gatewayOrderId"].as_str().unwrap();
    let signature = sign(KEY_SECRET, format!("{gateway_order_id}|pay_42").as_bytes());
    let (status, verified) = send(
        &app,
        post_json(
            "/payment/verify",
            &json!({
                "gatewayOrderId": gateway_order_id,
                "gatewayPaymentId": "pay_42",
                "signature": signature,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{verified}");
    assert_eq!(verified["success"], true);
    assert_eq!(verified["orderId"], order_id.as_str());
    assert!(verified["invoiceUrl"].as_str().unwrap().starts_with("https://invoices.test/invoices/FC"));

    let token = create_token("ops", JWT_SECRET).unwrap();
    let (status, order) = send(&app, get_with_bearer(&format!("/admin/orders/{order_id}"), &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "CONFIRMED");
    assert_eq!(order["paymentStatus"], "PAID");
    assert_eq!(order["total"], 94_900);
    // Tokens never leave the server
    assert!(order.get("idempotencyKey").is_none());
    assert!(order.get("paymentFailureToken").is_none());
}

#[tokio::test]
async fn checkout_errors_use_envelope() {
    let app = app(vec![product("prawns", 30_000, 1)]);

    let (status, body) = send(&app, post_json("/orders", &checkout_body("prawns", 2, 60_000, 4_900))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], 6003);
    assert_eq!(body["details"]["available"], 1);

    let (status, body) = send(&app, post_json("/orders", &checkout_body("prawns", 1, 25_000, 4_900))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["code"].as_u64().is_some());

    let (status, _) = send(&app, post_json("/orders", &checkout_body("squid", 1, 1_000, 4_900))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn verify_rejects_bad_signature() {
    let app = app(vec![product("crab", 80_000, 2)]);
    let (_, created) = send(&app, post_json("/orders", &checkout_body("crab", 1, 80_000, 4_900))).await;
    let (_, init) = send(
        &app,
        post_json(
            "/payment/create-order",
            &json!({ "orderId": created["orderId"], "paymentInitToken": created["paymentInitToken"] }),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        post_json(
            "/payment/verify",
            &json!({
                "gatewayOrderId": init["gatewayOrderId"],
                "gatewayPaymentId": "pay_1",
                "signature": "00".repeat(32),
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 5007);

    let (status, _) = send(
        &app,
        post_json(
            "/payment/create-order",
            &json!({ "orderId": created["orderId"], "paymentInitToken": "forged" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn payment_failure_report() {
    let app = app(vec![product("crab", 80_000, 2)]);
    let (_, created) = send(&app, post_json("/orders", &checkout_body("crab", 1, 80_000, 4_900))).await;
    let (_, init) = send(
        &app,
        post_json(
            "/payment/create-order",
            &json!({ "orderId": created["orderId"], "paymentInitToken": created["paymentInitToken"] }),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        post_json(
            "/payment/failed",
            &json!({ "orderId": created["orderId"], "failureToken": init["failureToken"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn cron_requires_bearer_secret() {
    let app = app(vec![product("tuna", 55_000, 0)]);

    let (status, _) = send(&app, Request::get("/cron/order-cleanup").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, get_with_bearer("/cron/daily-reset", "wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, get_with_bearer("/cron/order-cleanup", CRON_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelledCount"], 0);

    let (status, body) = send(&app, get_with_bearer("/cron/daily-reset", CRON_SECRET)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["restockedCount"], 1);
}

#[tokio::test]
async fn admin_routes_require_jwt() {
    let app = app(vec![product("tuna", 55_000, 2)]);

    let (status, _) = send(&app, Request::get("/admin/orders").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, get_with_bearer("/admin/orders", "not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = create_token("ops", JWT_SECRET).unwrap();
    let (_, created) = send(&app, post_json("/orders", &checkout_body("tuna", 1, 55_000, 4_900))).await;
    let order_id = created["orderId"].as_str().unwrap();

    let (status, orders) = send(&app, get_with_bearer("/admin/orders?status=PENDING&limit=10", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(orders.as_array().unwrap().len(), 1);

    let cancel = Request::patch(format!("/admin/orders/{order_id}/status"))
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "status": "CANCELLED" }).to_string()))
        .unwrap();
    let (status, order) = send(&app, cancel).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "CANCELLED");
    assert_eq!(order["cancelReason"], "OPERATOR");

    let restock = Request::put("/admin/products/tuna/stock")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "stock": 5 }).to_string()))
        .unwrap();
    let (status, product) = send(&app, restock).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(product["stock"], 5);
    assert_eq!(product["inStock"], true);
}

#[tokio::test]
async fn webhook_checks_signature_and_dedupes() {
    let app = app(vec![product("mackerel", 20_000, 5)]);
    let (_, created) = send(&app, post_json("/orders", &checkout_body("mackerel", 1, 20_000, 4_900))).await;
    let (_, init) = send(
        &app,
        post_json(
            "/payment/create-order",
            &json!({ "orderId": created["orderId"], "paymentInitToken": created["paymentInitToken"] }),
        ),
    )
    .await;

    let payload = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_hook",
            "order_id": init["gatewayOrderId"],
        } } },
    })
    .to_string();
    let webhook = |signature: String| {
        Request::post("/payment/webhook")
            .header("x-razorpay-signature", signature)
            .header("x-razorpay-event-id", "evt_hook_1")
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let (status, _) = send(&app, webhook("ab".repeat(32))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let good = sign(WEBHOOK_SECRET, payload.as_bytes());
    let (status, _) = send(&app, webhook(good.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, webhook(good)).await;
    assert_eq!(status, StatusCode::OK);

    let token = create_token("ops", JWT_SECRET).unwrap();
    let order_id = created["orderId"].as_str().unwrap();
    let (_, order) = send(&app, get_with_bearer(&format!("/admin/orders/{order_id}"), &token)).await;
    assert_eq!(order["paymentStatus"], "PAID");
    assert_eq!(order["gatewayPaymentId"], "pay_hook");
}

#[tokio::test]
async fn checkout_is_rate_limited_per_ip() {
    let app = app(vec![product("sardine", 10_000, 0)]);
    let body = checkout_body("sardine", 1, 10_000, 4_900);

    for _ in 0..10 {
        let (status, _) = send(&app, post_json("/orders", &body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
    let (status, body) = send(&app, post_json("/orders", &body)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], 9);
}
