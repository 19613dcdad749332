//! Charge management integration tests.

mod common;

use common::TestApp;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn syndic_creates_charge() {
    let app = TestApp::spawn().await;
    let syndic_id = Uuid::new_v4();

    let response = app
        .post(
            "/syndic/charges",
            syndic_id,
            "syndic",
            &json!({
                "apartment_id": Uuid::new_v4(),
                "building_id": Uuid::new_v4(),
                "resident_id": Uuid::new_v4(),
                "description": "Monthly maintenance",
                "amount": "500.00",
                "due_date": "2026-09-01"
            }),
        )
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "unpaid");
    assert_eq!(body["data"]["syndic_id"], syndic_id.to_string());

    app.cleanup().await;
}

#[tokio::test]
async fn charge_creation_rejects_non_positive_amount() {
    let app = TestApp::spawn().await;
    let syndic_id = Uuid::new_v4();

    let response = app
        .post(
            "/syndic/charges",
            syndic_id,
            "syndic",
            &json!({
                "apartment_id": Uuid::new_v4(),
                "building_id": Uuid::new_v4(),
                "resident_id": Uuid::new_v4(),
                "description": "Bad charge",
                "amount": "0.00",
                "due_date": "2026-09-01"
            }),
        )
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);

    app.cleanup().await;
}

#[tokio::test]
async fn resident_cannot_create_charge() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/syndic/charges",
            Uuid::new_v4(),
            "resident",
            &json!({
                "apartment_id": Uuid::new_v4(),
                "building_id": Uuid::new_v4(),
                "resident_id": Uuid::new_v4(),
                "description": "Not allowed",
                "amount": "100.00",
                "due_date": "2026-09-01"
            }),
        )
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 403);

    app.cleanup().await;
}

#[tokio::test]
async fn bulk_create_charges_one_per_apartment() {
    let app = TestApp::spawn().await;
    let syndic_id = Uuid::new_v4();
    let building_id = Uuid::new_v4();

    let items: Vec<serde_json::Value> = (0..3)
        .map(|i| {
            json!({
                "apartment_id": Uuid::new_v4(),
                "resident_id": Uuid::new_v4(),
                "amount": format!("{}.00", 100 * (i + 1))
            })
        })
        .collect();

    let response = app
        .post(
            "/syndic/charges/bulk",
            syndic_id,
            "syndic",
            &json!({
                "building_id": building_id,
                "description": "Q3 maintenance",
                "due_date": "2026-09-01",
                "items": items
            }),
        )
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"]["created"], 3);

    let response = app
        .get("/syndic/charges", syndic_id, "syndic")
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 3);

    app.cleanup().await;
}

#[tokio::test]
async fn list_charges_filters_by_status() {
    let app = TestApp::spawn().await;
    let syndic_id = Uuid::new_v4();
    app.seed_charge(syndic_id, Uuid::new_v4(), "100.00").await;
    app.seed_charge(syndic_id, Uuid::new_v4(), "200.00").await;

    let response = app
        .get("/syndic/charges?status=unpaid", syndic_id, "syndic")
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let response = app
        .get("/syndic/charges?status=paid", syndic_id, "syndic")
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    // Unknown status filters are rejected, not silently ignored
    let response = app
        .get("/syndic/charges?status=bogus", syndic_id, "syndic")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
async fn syndics_only_see_their_own_charges() {
    let app = TestApp::spawn().await;
    let syndic_a = Uuid::new_v4();
    let syndic_b = Uuid::new_v4();
    app.seed_charge(syndic_a, Uuid::new_v4(), "100.00").await;

    let response = app
        .get("/syndic/charges", syndic_b, "syndic")
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    app.cleanup().await;
}

#[tokio::test]
async fn resident_lists_own_charges() {
    let app = TestApp::spawn().await;
    let resident_id = Uuid::new_v4();
    app.seed_charge(Uuid::new_v4(), resident_id, "150.00").await;
    app.seed_charge(Uuid::new_v4(), Uuid::new_v4(), "999.00").await;

    let response = app
        .get("/resident/charges", resident_id, "resident")
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.unwrap();
    let charges = body["data"].as_array().unwrap();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0]["resident_id"], resident_id.to_string());

    app.cleanup().await;
}

#[tokio::test]
async fn delete_charge_refused_once_payments_exist() {
    let app = TestApp::spawn().await;
    let syndic_id = Uuid::new_v4();
    let resident_id = Uuid::new_v4();
    let charge = app.seed_charge(syndic_id, resident_id, "300.00").await;

    let response = app
        .post(
            &format!("/resident/charges/{}/pay", charge.charge_id),
            resident_id,
            "resident",
            &json!({ "amount": "100.00", "payment_method": "cash" }),
        )
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 201);

    let response = app
        .delete(
            &format!("/syndic/charges/{}", charge.charge_id),
            syndic_id,
            "syndic",
        )
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    // The charge is still there
    let still_there = app.db.get_charge(charge.charge_id).await.unwrap();
    assert!(still_there.is_some());

    app.cleanup().await;
}

#[tokio::test]
async fn delete_charge_without_payments_works() {
    let app = TestApp::spawn().await;
    let syndic_id = Uuid::new_v4();
    let charge = app.seed_charge(syndic_id, Uuid::new_v4(), "300.00").await;

    let response = app
        .delete(
            &format!("/syndic/charges/{}", charge.charge_id),
            syndic_id,
            "syndic",
        )
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    let gone = app.db.get_charge(charge.charge_id).await.unwrap();
    assert!(gone.is_none());

    app.cleanup().await;
}

#[tokio::test]
async fn delete_charge_requires_owning_syndic() {
    let app = TestApp::spawn().await;
    let charge = app.seed_charge(Uuid::new_v4(), Uuid::new_v4(), "300.00").await;

    let response = app
        .delete(
            &format!("/syndic/charges/{}", charge.charge_id),
            Uuid::new_v4(),
            "syndic",
        )
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 403);

    app.cleanup().await;
}

#[tokio::test]
async fn statistics_track_settlement() {
    let app = TestApp::spawn().await;
    let syndic_id = Uuid::new_v4();
    let resident_id = Uuid::new_v4();
    let charge = app.seed_charge(syndic_id, resident_id, "400.00").await;
    app.seed_charge(syndic_id, Uuid::new_v4(), "600.00").await;

    // Pay and confirm the first charge in full
    let response = app
        .post(
            &format!("/resident/charges/{}/pay", charge.charge_id),
            resident_id,
            "resident",
            &json!({ "payment_method": "bank_transfer" }),
        )
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.unwrap();
    let payment_id = body["data"]["payment"]["payment_id"].as_str().unwrap().to_string();

    app.post(
        &format!("/syndic/payments/{}/confirm", payment_id),
        syndic_id,
        "syndic",
        &json!({}),
    )
    .send()
    .await
    .expect("Failed to execute request");

    let response = app
        .get("/syndic/charges/statistics", syndic_id, "syndic")
        .send()
        .await
        .expect("Failed to execute request");
    let body: serde_json::Value = response.json().await.unwrap();
    let stats = &body["data"];
    assert_eq!(stats["total_charges"], 2);
    assert_eq!(stats["paid"], 1);
    assert_eq!(stats["unpaid"], 1);
    assert_eq!(
        stats["paid_amount"].as_str().unwrap().parse::<Decimal>().unwrap(),
        Decimal::from(400)
    );
    assert_eq!(stats["collection_rate"], 40.0);

    app.cleanup().await;
}
