//! Payment lifecycle through the HTTP surface: donation intake, webhook,
//! callback, verify and refund, driven with `tower::ServiceExt::oneshot`.

#![allow(clippy::panic)]

mod common;

use axum::http::StatusCode;
use axum::http::header::LOCATION;
use rust_decimal::Decimal;
use serde_json::{Value, json};

use common::{json_body, spawn_app};
use donation_ledger::domain::{TransactionId, UserId};
use donation_ledger::persistence::{AwardStore, LedgerStore};

fn location(response: &axum::http::Response<axum::body::Body>) -> String {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

#[tokio::test]
async fn create_donation_returns_payment_url() {
    let app = spawn_app().await;
    let response = app
        .post_json(
            "/api/v1/donations",
            &json!({
                "cause_id": app.cause.id.to_string(),
                "amount": "100",
                "cover_fee": true,
                "currency": "kwd",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = json_body(response).await;

    assert_eq!(
        body.pointer("/donation/payment_status"),
        Some(&json!("initiated"))
    );
    assert_eq!(body.pointer("/donation/currency"), Some(&json!("KWD")));
    let Some(total) = body
        .pointer("/donation/total_amount")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<Decimal>().ok())
    else {
        panic!("no total in {body}");
    };
    assert_eq!(total, Decimal::new(10250, 2));
    assert!(
        body.get("payment_url")
            .and_then(Value::as_str)
            .is_some_and(|u| u.starts_with("https://gateway.test/pay/"))
    );
}

#[tokio::test]
async fn invalid_donation_is_rejected() {
    let app = spawn_app().await;
    let response = app
        .post_json(
            "/api/v1/donations",
            &json!({ "cause_id": app.cause.id.to_string(), "amount": "-5" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body.pointer("/error/code"), Some(&json!(1001)));
}

#[tokio::test]
async fn paid_webhook_completes_donation_once() {
    let app = spawn_app().await;
    let user = UserId::new();
    let (donation_id, invoice_id) = app.donate(Some(&user.to_string())).await;
    app.gateway.set_status(&invoice_id, "Paid", Some("100200300"));

    let response = app
        .post_json(
            "/api/v1/payments/webhook",
            &json!({ "EventType": "PaymentSucceeded", "ResourceId": invoice_id }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.get("success"), Some(&json!(true)));
    assert_eq!(app.raised().await, Decimal::new(200, 0));

    // Replays and the browser callback change nothing.
    for _ in 0..3 {
        let replay = app
            .post_json(
                "/api/v1/payments/webhook",
                &json!({ "EventType": "PaymentSucceeded", "ResourceId": invoice_id }),
            )
            .await;
        assert_eq!(replay.status(), StatusCode::OK);
    }
    let callback = app
        .get("/api/v1/payments/callback?paymentId=100200300")
        .await;
    assert_eq!(callback.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&callback),
        format!("https://site.test/thanks?donation_id={donation_id}&status=completed")
    );
    assert_eq!(app.raised().await, Decimal::new(200, 0));

    let detail = json_body(app.get(&format!("/api/v1/donations/{donation_id}")).await).await;
    assert_eq!(
        detail.pointer("/donation/payment_status"),
        Some(&json!("completed"))
    );
    assert_eq!(
        detail.pointer("/transaction/gateway_payment_id"),
        Some(&json!("100200300"))
    );

    let Ok(awards) = app.ledger.awards_for(user).await else {
        panic!("award lookup failed");
    };
    assert_eq!(awards.len(), 1);
}

#[tokio::test]
async fn unknown_resource_is_acknowledged_without_writes() {
    let app = spawn_app().await;
    let (_, invoice_id) = app.donate(None).await;
    let before = app.gateway.status_calls();

    let response = app
        .post_json(
            "/api/v1/payments/webhook",
            &json!({ "EventType": "PaymentSucceeded", "ResourceId": "999999" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.get("success"), Some(&json!(false)));
    assert_eq!(app.gateway.status_calls(), before);
    assert_eq!(app.raised().await, Decimal::ZERO);

    let Ok(Some(txn)) = app.ledger.find_transaction_by_gateway_ref(&invoice_id).await else {
        panic!("transaction missing");
    };
    let Ok(checks) = app.ledger.gateway_checks(txn.id).await else {
        panic!("checks lookup failed");
    };
    assert!(checks.is_empty());
}

#[tokio::test]
async fn missing_resource_id_is_acknowledged() {
    let app = spawn_app().await;
    let response = app
        .post_json("/api/v1/payments/webhook", &json!({ "EventType": "PaymentSucceeded" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.get("success"), Some(&json!(false)));
}

#[tokio::test]
async fn numeric_resource_id_is_reconciled() {
    let app = spawn_app().await;
    let (_, invoice_id) = app.donate(None).await;
    app.gateway.set_status(&invoice_id, "Paid", None);
    let Ok(numeric) = invoice_id.parse::<u64>() else {
        panic!("invoice id {invoice_id} is not numeric");
    };

    let response = app
        .post_json(
            "/api/v1/payments/webhook",
            &json!({ "EventType": 1, "ResourceId": numeric }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.get("success"), Some(&json!(true)));
    assert_eq!(app.raised().await, Decimal::new(200, 0));
}

#[tokio::test]
async fn malformed_webhook_body_is_acknowledged() {
    let app = spawn_app().await;
    let Ok(request) = axum::http::Request::post("/api/v1/payments/webhook")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
    else {
        panic!("bad request");
    };
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.get("success"), Some(&json!(false)));

    let Ok(request) = axum::http::Request::post("/api/v1/payments/webhook")
        .body(axum::body::Body::from("ResourceId=1"))
    else {
        panic!("bad request");
    };
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.get("success"), Some(&json!(false)));
}

#[tokio::test]
async fn failure_report_after_completion_is_ignored() {
    let app = spawn_app().await;
    let (donation_id, invoice_id) = app.donate(None).await;
    app.gateway.set_status(&invoice_id, "Paid", None);
    let _ = app
        .post_json("/api/v1/payments/webhook", &json!({ "ResourceId": invoice_id }))
        .await;

    app.gateway.set_status(&invoice_id, "Failed", None);
    let response = app
        .post_json(
            "/api/v1/payments/webhook",
            &json!({ "EventType": "PaymentFailed", "ResourceId": invoice_id }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await.get("success"), Some(&json!(true)));

    let verify = json_body(app.get(&format!("/api/v1/payments/verify/{invoice_id}")).await).await;
    assert_eq!(verify.get("result"), Some(&json!("conflict")));
    assert_eq!(verify.get("status"), Some(&json!("completed")));
    assert_eq!(
        verify.pointer("/donation/id"),
        Some(&Value::String(donation_id))
    );
    assert_eq!(app.raised().await, Decimal::new(200, 0));
}

#[tokio::test]
async fn failed_payment_redirects_to_failure_page() {
    let app = spawn_app().await;
    let (donation_id, invoice_id) = app.donate(None).await;
    app.gateway.set_status(&invoice_id, "Expired", Some("777"));

    let response = app.get("/api/v1/payments/callback?paymentId=777").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        format!("https://site.test/sorry?error=payment_failed&donation_id={donation_id}")
    );
    assert_eq!(app.raised().await, Decimal::ZERO);
}

#[tokio::test]
async fn unknown_callback_redirects_with_error_code() {
    let app = spawn_app().await;
    let response = app.get("/api/v1/payments/callback?paymentId=nobody").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        "https://site.test/sorry?error=transaction_not_found"
    );

    let missing = app.get("/api/v1/payments/callback").await;
    assert_eq!(
        location(&missing),
        "https://site.test/sorry?error=missing_payment_id"
    );
}

#[tokio::test]
async fn verify_accepts_local_transaction_id() {
    let app = spawn_app().await;
    let (_, invoice_id) = app.donate(None).await;
    let Ok(Some(txn)) = app.ledger.find_transaction_by_gateway_ref(&invoice_id).await else {
        panic!("transaction missing");
    };
    app.gateway.set_status(&invoice_id, "Paid", None);

    let body = json_body(
        app.get(&format!("/api/v1/payments/verify/{}", txn.id))
            .await,
    )
    .await;
    assert_eq!(body.get("result"), Some(&json!("applied")));
    assert_eq!(body.get("gateway_status"), Some(&json!("Paid")));

    let missing = app
        .get(&format!("/api/v1/payments/verify/{}", TransactionId::new()))
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refund_reverses_cause_total() {
    let app = spawn_app().await;
    let (donation_id, invoice_id) = app.donate(None).await;

    let early = app
        .post_json(&format!("/api/v1/donations/{donation_id}/refund"), &json!({}))
        .await;
    assert_eq!(early.status(), StatusCode::BAD_REQUEST);

    app.gateway.set_status(&invoice_id, "Paid", None);
    let _ = app.get(&format!("/api/v1/payments/verify/{invoice_id}")).await;
    assert_eq!(app.raised().await, Decimal::new(200, 0));

    let refund = app
        .post_json(&format!("/api/v1/donations/{donation_id}/refund"), &json!({}))
        .await;
    assert_eq!(refund.status(), StatusCode::OK);
    let body = json_body(refund).await;
    assert_eq!(body.get("status"), Some(&json!("refunded")));
    assert_eq!(app.raised().await, Decimal::ZERO);

    // A later Paid report cannot resurrect the donation.
    let verify = json_body(app.get(&format!("/api/v1/payments/verify/{invoice_id}")).await).await;
    assert_eq!(verify.get("result"), Some(&json!("conflict")));
    assert_eq!(app.raised().await, Decimal::ZERO);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_webhooks_and_callbacks_credit_once() {
    let app = spawn_app().await;
    let (_, invoice_id) = app.donate(None).await;
    app.gateway.set_status(&invoice_id, "Paid", Some("race-1"));

    let mut handles = Vec::new();
    for i in 0..8 {
        let router = app.router.clone();
        let invoice_id = invoice_id.clone();
        handles.push(tokio::spawn(async move {
            use tower::ServiceExt;
            let request = if i % 2 == 0 {
                axum::http::Request::post("/api/v1/payments/webhook")
                    .header("content-type", "application/json")
                    .body(axum::body::Body::from(
                        json!({ "ResourceId": invoice_id }).to_string(),
                    ))
            } else {
                axum::http::Request::get(format!("/api/v1/payments/verify/{invoice_id}"))
                    .body(axum::body::Body::empty())
            };
            let Ok(request) = request else {
                panic!("bad request");
            };
            router.oneshot(request).await
        }));
    }
    for handle in handles {
        let Ok(Ok(response)) = handle.await else {
            panic!("request failed");
        };
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(app.raised().await, Decimal::new(200, 0));

    let Ok(Some(progress)) = app.ledger.cause_progress(app.cause.id).await else {
        panic!("progress missing");
    };
    assert_eq!(progress.donor_count, 1);
}

#[tokio::test]
async fn payment_methods_are_listed() {
    let app = spawn_app().await;
    let response = app.get("/api/v1/payment-methods?amount=10.5").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body.pointer("/0/currency"), Some(&json!("KWD")));
}

#[tokio::test]
async fn unknown_cause_progress_is_not_found() {
    let app = spawn_app().await;
    let response = app
        .get("/api/v1/causes/00000000-0000-0000-0000-000000000000/progress")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body.pointer("/error/code"), Some(&json!(2001)));
}

#[tokio::test]
async fn health_reports_version() {
    let app = spawn_app().await;
    let body = json_body(app.get("/health").await).await;
    assert_eq!(body.get("status"), Some(&json!("healthy")));
    assert!(body.get("version").is_some());
}
