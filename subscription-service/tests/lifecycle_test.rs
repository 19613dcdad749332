mod common;

use chrono::{Days, Utc};
use common::TestApp;
use uuid::Uuid;

#[tokio::test]
async fn assign_plan_creates_active_subscription() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();
    let syndic = Uuid::new_v4();
    let plan = app.seed_plan("Starter", "29.00", 30).await;

    let response = app
        .post(
            "/admin/subscriptions/assign",
            admin,
            "admin",
            &serde_json::json!({ "syndic_id": syndic, "plan_id": plan.plan_id }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();

    let today = Utc::now().date_naive();
    let expected_end = today.checked_add_days(Days::new(30)).unwrap();
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["is_active"], true);
    assert_eq!(body["data"]["start_date"], today.to_string());
    assert_eq!(body["data"]["end_date"], expected_end.to_string());
    assert_eq!(body["data"]["days_remaining"], 30);

    app.cleanup().await;
}

#[tokio::test]
async fn syndic_cannot_assign_plans() {
    let app = TestApp::spawn().await;
    let syndic = Uuid::new_v4();
    let plan = app.seed_plan("Starter", "29.00", 30).await;

    let response = app
        .post(
            "/admin/subscriptions/assign",
            syndic,
            "syndic",
            &serde_json::json!({ "syndic_id": syndic, "plan_id": plan.plan_id }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    app.cleanup().await;
}

#[tokio::test]
async fn assign_replaces_existing_subscription() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();
    let syndic = Uuid::new_v4();
    let starter = app.seed_plan("Starter", "29.00", 30).await;
    let premium = app.seed_plan("Premium", "99.00", 90).await;

    let first = app.db.assign_plan(syndic, starter.plan_id, None).await.unwrap();

    let response = app
        .post(
            "/admin/subscriptions/assign",
            admin,
            "admin",
            &serde_json::json!({ "syndic_id": syndic, "plan_id": premium.plan_id }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();

    // One subscription per syndic: same row, new plan and period
    assert_eq!(
        body["data"]["subscription_id"],
        serde_json::json!(first.subscription_id)
    );
    assert_eq!(body["data"]["plan_id"], serde_json::json!(premium.plan_id));
    assert_eq!(body["data"]["days_remaining"], 90);

    app.cleanup().await;
}

#[tokio::test]
async fn assign_refuses_inactive_plan() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();
    let plan = app.seed_plan("Retired", "29.00", 30).await;
    app.db.set_plan_active(plan.plan_id, false).await.unwrap();

    let response = app
        .post(
            "/admin/subscriptions/assign",
            admin,
            "admin",
            &serde_json::json!({ "syndic_id": Uuid::new_v4(), "plan_id": plan.plan_id }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn renewal_of_live_subscription_chains_periods() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();
    let syndic = Uuid::new_v4();
    let plan = app.seed_plan("Starter", "29.00", 30).await;

    let subscription = app.db.assign_plan(syndic, plan.plan_id, None).await.unwrap();

    let response = app
        .post(
            &format!("/admin/subscriptions/{}/renew", subscription.subscription_id),
            admin,
            "admin",
            &serde_json::json!({}),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();

    let new_start = subscription.end_date.succ_opt().unwrap();
    let new_end = new_start.checked_add_days(Days::new(30)).unwrap();
    assert_eq!(body["data"]["start_date"], new_start.to_string());
    assert_eq!(body["data"]["end_date"], new_end.to_string());
    assert_eq!(body["data"]["status"], "active");

    app.cleanup().await;
}

#[tokio::test]
async fn renewal_of_lapsed_subscription_restarts_today() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();
    let syndic = Uuid::new_v4();
    let plan = app.seed_plan("Starter", "29.00", 30).await;

    let today = Utc::now().date_naive();
    let past_start = today.checked_sub_days(Days::new(90)).unwrap();
    let subscription = app
        .db
        .assign_plan(syndic, plan.plan_id, Some(past_start))
        .await
        .unwrap();
    assert!(subscription.end_date < today);

    let response = app
        .post(
            &format!("/admin/subscriptions/{}/renew", subscription.subscription_id),
            admin,
            "admin",
            &serde_json::json!({ "duration_days": 60 }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();

    let expected_end = today.checked_add_days(Days::new(60)).unwrap();
    assert_eq!(body["data"]["start_date"], today.to_string());
    assert_eq!(body["data"]["end_date"], expected_end.to_string());
    assert_eq!(body["data"]["is_active"], true);

    app.cleanup().await;
}

#[tokio::test]
async fn renew_unknown_subscription_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            &format!("/admin/subscriptions/{}/renew", Uuid::new_v4()),
            Uuid::new_v4(),
            "admin",
            &serde_json::json!({}),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
async fn suspend_and_reactivate() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();
    let syndic = Uuid::new_v4();
    let plan = app.seed_plan("Starter", "29.00", 30).await;
    let subscription = app.db.assign_plan(syndic, plan.plan_id, None).await.unwrap();

    let response = app
        .post(
            &format!("/admin/subscriptions/{}/suspend", subscription.subscription_id),
            admin,
            "admin",
            &serde_json::json!({}),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "suspended");
    assert_eq!(body["data"]["is_active"], false);

    let response = app
        .post(
            &format!("/admin/subscriptions/{}/activate", subscription.subscription_id),
            admin,
            "admin",
            &serde_json::json!({}),
        )
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["is_active"], true);

    app.cleanup().await;
}

#[tokio::test]
async fn cancellation_clears_auto_renew() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();
    let syndic = Uuid::new_v4();
    let plan = app.seed_plan("Starter", "29.00", 30).await;
    let subscription = app.db.assign_plan(syndic, plan.plan_id, None).await.unwrap();

    sqlx::query("UPDATE subscriptions SET auto_renew = TRUE WHERE subscription_id = $1")
        .bind(subscription.subscription_id)
        .execute(app.db.pool())
        .await
        .unwrap();

    let response = app
        .post(
            &format!("/admin/subscriptions/{}/cancel", subscription.subscription_id),
            admin,
            "admin",
            &serde_json::json!({}),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["data"]["auto_renew"], false);

    app.cleanup().await;
}

#[tokio::test]
async fn syndic_reads_own_subscription_with_plan() {
    let app = TestApp::spawn().await;
    let syndic = Uuid::new_v4();
    let plan = app.seed_plan("Premium", "99.00", 90).await;
    app.db.assign_plan(syndic, plan.plan_id, None).await.unwrap();

    let response = app
        .get("/syndic/subscription", syndic, "syndic")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["days_remaining"], 90);
    assert_eq!(body["data"]["plan"]["name"], "Premium");

    app.cleanup().await;
}

#[tokio::test]
async fn syndic_without_subscription_gets_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .get("/syndic/subscription", Uuid::new_v4(), "syndic")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    app.cleanup().await;
}
