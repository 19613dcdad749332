//! Subscription lifecycle endpoints.

use crate::models::SubscriptionStatus;
use crate::startup::AppState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use service_core::auth::{Principal, Role};
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct AssignPlanRequest {
    pub syndic_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: Option<NaiveDate>,
}

/// Admin replacement path: the syndic's subscription is overwritten with a
/// fresh period regardless of what was there.
pub async fn assign_plan(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<AssignPlanRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;

    let subscription = state
        .db
        .assign_plan(body.syndic_id, body.plan_id, body.start_date)
        .await?;

    Ok(Json(ApiResponse::with_message(
        "Plan assigned",
        subscription.view(Utc::now().date_naive()),
    )))
}

#[derive(Debug, Default, Deserialize)]
pub struct RenewRequest {
    pub duration_days: Option<i32>,
}

pub async fn renew_subscription(
    State(state): State<AppState>,
    principal: Principal,
    Path(subscription_id): Path<Uuid>,
    Json(body): Json<RenewRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;

    let subscription = state
        .db
        .renew_subscription(subscription_id, body.duration_days)
        .await?;

    Ok(Json(ApiResponse::with_message(
        "Subscription renewed",
        subscription.view(Utc::now().date_naive()),
    )))
}

pub async fn suspend_subscription(
    State(state): State<AppState>,
    principal: Principal,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;
    let subscription = state
        .db
        .set_subscription_status(subscription_id, SubscriptionStatus::Suspended)
        .await?;
    Ok(Json(ApiResponse::with_message(
        "Subscription suspended",
        subscription.view(Utc::now().date_naive()),
    )))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    principal: Principal,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;
    let subscription = state
        .db
        .set_subscription_status(subscription_id, SubscriptionStatus::Cancelled)
        .await?;
    Ok(Json(ApiResponse::with_message(
        "Subscription cancelled",
        subscription.view(Utc::now().date_naive()),
    )))
}

pub async fn activate_subscription(
    State(state): State<AppState>,
    principal: Principal,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;
    let subscription = state
        .db
        .set_subscription_status(subscription_id, SubscriptionStatus::Active)
        .await?;
    Ok(Json(ApiResponse::with_message(
        "Subscription activated",
        subscription.view(Utc::now().date_naive()),
    )))
}

#[derive(Debug, Serialize)]
pub struct MySubscriptionResponse {
    #[serde(flatten)]
    pub subscription: crate::models::SubscriptionView,
    pub plan: Option<crate::models::SubscriptionPlan>,
}

/// Syndic view of their own subscription, with the derived activity fields
/// and the plan alongside.
pub async fn my_subscription(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Syndic)?;

    let subscription = state
        .db
        .get_subscription_for_syndic(principal.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No subscription found".to_string()))?;

    let plan = state.db.get_plan(subscription.plan_id).await?;

    Ok(Json(ApiResponse::data(MySubscriptionResponse {
        subscription: subscription.view(Utc::now().date_naive()),
        plan,
    })))
}
