mod common;

use common::TestApp;
use rust_decimal::Decimal;
use uuid::Uuid;

fn plan_body(name: &str, price: &str, duration_days: i32) -> serde_json::Value {
    serde_json::json!({
        "name": name,
        "description": "test plan",
        "price": price,
        "duration_days": duration_days,
        "max_buildings": 3,
        "max_apartments": 60
    })
}

#[tokio::test]
async fn admin_creates_and_lists_plan() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();

    let response = app
        .post("/admin/plans", admin, "admin", &plan_body("Basic", "29.90", 30))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["name"], "Basic");
    assert_eq!(body["data"]["is_active"], true);
    let price: Decimal = body["data"]["price"].as_str().unwrap().parse().unwrap();
    assert_eq!(price, "29.90".parse::<Decimal>().unwrap());

    let response = app.get("/plans", admin, "admin").send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    app.cleanup().await;
}

#[tokio::test]
async fn create_plan_rejects_nonpositive_price() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();

    let response = app
        .post("/admin/plans", admin, "admin", &plan_body("Free", "0", 30))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn syndic_cannot_create_plan() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/admin/plans",
            Uuid::new_v4(),
            "syndic",
            &plan_body("Sneaky", "10.00", 30),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    app.cleanup().await;
}

#[tokio::test]
async fn syndic_sees_only_active_plans() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();
    let syndic = Uuid::new_v4();

    app.seed_plan("Visible", "19.00", 30).await;
    let hidden = app.seed_plan("Hidden", "49.00", 90).await;

    let response = app
        .post(
            &format!("/admin/plans/{}/deactivate", hidden.plan_id),
            admin,
            "admin",
            &serde_json::json!({}),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app.get("/plans", syndic, "syndic").send().await.unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    let plans = body["data"].as_array().unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0]["name"], "Visible");

    // Admin still sees both
    let response = app.get("/plans", admin, "admin").send().await.unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    app.cleanup().await;
}

#[tokio::test]
async fn rename_is_allowed_with_active_subscription() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();

    let plan = app.seed_plan("Old Name", "29.00", 30).await;
    app.db
        .assign_plan(Uuid::new_v4(), plan.plan_id, None)
        .await
        .unwrap();

    let response = app
        .put(
            &format!("/admin/plans/{}", plan.plan_id),
            admin,
            "admin",
            &serde_json::json!({ "name": "New Name" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["name"], "New Name");

    app.cleanup().await;
}

#[tokio::test]
async fn price_change_refused_with_active_subscription() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();

    let plan = app.seed_plan("Frozen", "29.00", 30).await;
    app.db
        .assign_plan(Uuid::new_v4(), plan.plan_id, None)
        .await
        .unwrap();

    let response = app
        .put(
            &format!("/admin/plans/{}", plan.plan_id),
            admin,
            "admin",
            &serde_json::json!({ "price": "39.00" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Same-value write is not a change and passes
    let response = app
        .put(
            &format!("/admin/plans/{}", plan.plan_id),
            admin,
            "admin",
            &serde_json::json!({ "price": "29.00" }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    app.cleanup().await;
}

#[tokio::test]
async fn price_change_allowed_without_active_subscription() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();

    let plan = app.seed_plan("Mutable", "29.00", 30).await;

    let response = app
        .put(
            &format!("/admin/plans/{}", plan.plan_id),
            admin,
            "admin",
            &serde_json::json!({ "price": "39.00", "duration_days": 60 }),
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    let price: Decimal = body["data"]["price"].as_str().unwrap().parse().unwrap();
    assert_eq!(price, "39.00".parse::<Decimal>().unwrap());
    assert_eq!(body["data"]["duration_days"], 60);

    app.cleanup().await;
}

#[tokio::test]
async fn delete_plan_refused_when_referenced() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();

    let plan = app.seed_plan("Referenced", "29.00", 30).await;
    app.db
        .assign_plan(Uuid::new_v4(), plan.plan_id, None)
        .await
        .unwrap();

    let response = app
        .delete(&format!("/admin/plans/{}", plan.plan_id), admin, "admin")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Still listed
    let response = app.get("/plans", admin, "admin").send().await.unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    app.cleanup().await;
}

#[tokio::test]
async fn delete_unreferenced_plan_succeeds() {
    let app = TestApp::spawn().await;
    let admin = Uuid::new_v4();

    let plan = app.seed_plan("Disposable", "29.00", 30).await;

    let response = app
        .delete(&format!("/admin/plans/{}", plan.plan_id), admin, "admin")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app.get("/plans", admin, "admin").send().await.unwrap();
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["data"].as_array().unwrap().is_empty());

    app.cleanup().await;
}
