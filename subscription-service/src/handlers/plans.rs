//! Plan administration and the syndic-facing catalogue.

use crate::models::{CreatePlan, ListPlansFilter, UpdatePlan};
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use service_core::auth::{Principal, Role};
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

pub async fn create_plan(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CreatePlan>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;

    if body.name.trim().is_empty() {
        return Err(AppError::Validation("Plan name must not be empty".to_string()));
    }

    let plan = state.db.create_plan(&body).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Plan created", plan)),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListPlansQuery {
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

/// Admins see the full catalogue and may filter; everyone else only sees
/// active plans.
pub async fn list_plans(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListPlansQuery>,
) -> Result<impl IntoResponse, AppError> {
    let is_active = if principal.is_admin() {
        params.is_active
    } else {
        Some(true)
    };

    let plans = state
        .db
        .list_plans(&ListPlansFilter {
            is_active,
            name_search: params.search,
        })
        .await?;

    Ok(Json(ApiResponse::data(plans)))
}

pub async fn update_plan(
    State(state): State<AppState>,
    principal: Principal,
    Path(plan_id): Path<Uuid>,
    Json(body): Json<UpdatePlan>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;

    let plan = state.db.update_plan(plan_id, &body).await?;

    Ok(Json(ApiResponse::with_message("Plan updated", plan)))
}

pub async fn activate_plan(
    State(state): State<AppState>,
    principal: Principal,
    Path(plan_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;
    let plan = state.db.set_plan_active(plan_id, true).await?;
    Ok(Json(ApiResponse::with_message("Plan activated", plan)))
}

pub async fn deactivate_plan(
    State(state): State<AppState>,
    principal: Principal,
    Path(plan_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;
    let plan = state.db.set_plan_active(plan_id, false).await?;
    Ok(Json(ApiResponse::with_message("Plan deactivated", plan)))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    principal: Principal,
    Path(plan_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Admin)?;

    state.db.delete_plan(plan_id).await?;

    Ok(Json(ApiResponse::message("Plan deleted")))
}
