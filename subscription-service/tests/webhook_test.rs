mod common;

use chrono::{Days, Utc};
use common::TestApp;
use subscription_service::models::{
    CreateSubscriptionPayment, SubscriptionPaymentMethod, SubscriptionPaymentStatus,
};
use uuid::Uuid;

/// Seed a card payment waiting on its intent, the state create-order leaves
/// behind.
async fn seed_card_payment(app: &TestApp, syndic: Uuid, intent_id: &str) -> (Uuid, Uuid) {
    let plan = app.seed_plan("Starter", "29.00", 30).await;
    let subscription = app
        .db
        .ensure_subscription(syndic, plan.plan_id)
        .await
        .unwrap();
    let payment = app
        .db
        .create_subscription_payment(&CreateSubscriptionPayment {
            subscription_id: subscription.subscription_id,
            amount: "29.00".parse().unwrap(),
            currency: "EUR".to_string(),
            payment_method: SubscriptionPaymentMethod::Card,
            status: SubscriptionPaymentStatus::RequiresPaymentMethod,
            provider_order_id: Some(intent_id.to_string()),
            provider_customer_id: None,
            metadata: serde_json::json!({ "plan_id": plan.plan_id }),
            reference: None,
            notes: None,
        })
        .await
        .unwrap();
    (payment.payment_id, subscription.subscription_id)
}

fn succeeded_event(intent_id: &str, charge_id: &str) -> String {
    serde_json::json!({
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": intent_id, "latest_charge": charge_id } }
    })
    .to_string()
}

async fn deliver(app: &TestApp, body: &str, signature: &str) -> reqwest::Response {
    app.client
        .post(format!("{}/gateway/webhooks/card", app.address))
        .header("Stripe-Signature", signature)
        .header("Content-Type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn signed_success_event_settles_the_payment() {
    let app = TestApp::spawn().await;
    let syndic = Uuid::new_v4();
    let (payment_id, subscription_id) = seed_card_payment(&app, syndic, "pi_ok_1").await;

    let body = succeeded_event("pi_ok_1", "ch_777");
    let signature = app
        .stripe_signer()
        .sign_payload(Utc::now().timestamp(), &body);

    let response = deliver(&app, &body, &signature).await;
    assert_eq!(response.status(), 200);
    let ack: serde_json::Value = response.json().await.unwrap();
    assert_eq!(ack["message"], "processed");

    let payment = app
        .db
        .get_subscription_payment(payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, "completed");
    assert_eq!(payment.provider_transaction_id.as_deref(), Some("ch_777"));

    let subscription = app
        .db
        .get_subscription(subscription_id)
        .await
        .unwrap()
        .unwrap();
    let today = Utc::now().date_naive();
    assert_eq!(subscription.status, "active");
    assert_eq!(
        subscription.end_date,
        today.checked_add_days(Days::new(30)).unwrap()
    );

    app.cleanup().await;
}

#[tokio::test]
async fn replayed_delivery_never_extends_twice() {
    let app = TestApp::spawn().await;
    let syndic = Uuid::new_v4();
    let (_, subscription_id) = seed_card_payment(&app, syndic, "pi_replay").await;

    let body = succeeded_event("pi_replay", "ch_1");
    let signature = app
        .stripe_signer()
        .sign_payload(Utc::now().timestamp(), &body);

    assert_eq!(deliver(&app, &body, &signature).await.status(), 200);
    let end_after_first = app
        .db
        .get_subscription(subscription_id)
        .await
        .unwrap()
        .unwrap()
        .end_date;

    assert_eq!(deliver(&app, &body, &signature).await.status(), 200);
    let end_after_second = app
        .db
        .get_subscription(subscription_id)
        .await
        .unwrap()
        .unwrap()
        .end_date;

    assert_eq!(end_after_first, end_after_second);

    app.cleanup().await;
}

#[tokio::test]
async fn failure_event_marks_the_payment_failed() {
    let app = TestApp::spawn().await;
    let syndic = Uuid::new_v4();
    let (payment_id, subscription_id) = seed_card_payment(&app, syndic, "pi_declined").await;

    let body = serde_json::json!({
        "type": "payment_intent.payment_failed",
        "data": { "object": {
            "id": "pi_declined",
            "last_payment_error": { "message": "Your card was declined." }
        } }
    })
    .to_string();
    let signature = app
        .stripe_signer()
        .sign_payload(Utc::now().timestamp(), &body);

    let response = deliver(&app, &body, &signature).await;
    assert_eq!(response.status(), 200);

    let payment = app
        .db
        .get_subscription_payment(payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, "failed");
    assert_eq!(
        payment.metadata["failure_reason"],
        "Your card was declined."
    );

    let subscription = app
        .db
        .get_subscription(subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscription.status, "expired");

    app.cleanup().await;
}

#[tokio::test]
async fn invalid_signature_changes_no_state() {
    let app = TestApp::spawn().await;
    let syndic = Uuid::new_v4();
    let (payment_id, _) = seed_card_payment(&app, syndic, "pi_forged").await;

    let body = succeeded_event("pi_forged", "ch_1");
    let timestamp = Utc::now().timestamp();
    let forged = format!("t={},v1={}", timestamp, "0".repeat(64));

    let response = deliver(&app, &body, &forged).await;
    assert_eq!(response.status(), 400);

    let payment = app
        .db
        .get_subscription_payment(payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, "requires_payment_method");

    app.cleanup().await;
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/gateway/webhooks/card", app.address))
        .header("Content-Type", "application/json")
        .body(succeeded_event("pi_x", "ch_x"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_payment_is_acknowledged() {
    let app = TestApp::spawn().await;

    let body = succeeded_event("pi_not_ours", "ch_1");
    let signature = app
        .stripe_signer()
        .sign_payload(Utc::now().timestamp(), &body);

    let response = deliver(&app, &body, &signature).await;
    assert_eq!(response.status(), 200);
    let ack: serde_json::Value = response.json().await.unwrap();
    assert_eq!(ack["message"], "ignored");

    app.cleanup().await;
}

#[tokio::test]
async fn unhandled_event_types_are_acknowledged() {
    let app = TestApp::spawn().await;
    let syndic = Uuid::new_v4();
    let (payment_id, _) = seed_card_payment(&app, syndic, "pi_other").await;

    let body = serde_json::json!({
        "type": "payment_intent.created",
        "data": { "object": { "id": "pi_other" } }
    })
    .to_string();
    let signature = app
        .stripe_signer()
        .sign_payload(Utc::now().timestamp(), &body);

    let response = deliver(&app, &body, &signature).await;
    assert_eq!(response.status(), 200);
    let ack: serde_json::Value = response.json().await.unwrap();
    assert_eq!(ack["message"], "ignored");

    let payment = app
        .db
        .get_subscription_payment(payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, "requires_payment_method");

    app.cleanup().await;
}
