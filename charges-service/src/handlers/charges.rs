//! Syndic charge management and resident charge listing.

use crate::models::{ChargeStatus, CreateCharge, ListChargesFilter};
use crate::services::record_charge_created;
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::auth::{Principal, Role};
use service_core::error::AppError;
use service_core::response::ApiResponse;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct CreateChargeRequest {
    pub apartment_id: Uuid,
    pub building_id: Uuid,
    pub resident_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    /// Admin-only override; syndics always create for themselves.
    pub syndic_id: Option<Uuid>,
}

pub async fn create_charge(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<CreateChargeRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Syndic)?;
    let syndic_id = resolve_syndic(&principal, body.syndic_id);

    if body.description.trim().is_empty() {
        return Err(AppError::Validation(
            "Description must not be empty".to_string(),
        ));
    }

    let charge = state
        .db
        .create_charge(&CreateCharge {
            apartment_id: body.apartment_id,
            building_id: body.building_id,
            syndic_id,
            resident_id: body.resident_id,
            description: body.description,
            amount: body.amount,
            due_date: body.due_date,
        })
        .await?;

    record_charge_created(&syndic_id.to_string());

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Charge created", charge)),
    ))
}

#[derive(Debug, Deserialize)]
pub struct BulkChargeItem {
    pub apartment_id: Uuid,
    pub resident_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateChargesRequest {
    pub building_id: Uuid,
    pub description: String,
    pub due_date: NaiveDate,
    pub items: Vec<BulkChargeItem>,
    pub syndic_id: Option<Uuid>,
}

#[derive(Debug, serde::Serialize)]
pub struct BulkCreateChargesResponse {
    pub created: u64,
}

/// Create one charge per apartment of a building in a single transaction.
pub async fn bulk_create_charges(
    State(state): State<AppState>,
    principal: Principal,
    Json(body): Json<BulkCreateChargesRequest>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Syndic)?;
    let syndic_id = resolve_syndic(&principal, body.syndic_id);

    if body.items.is_empty() {
        return Err(AppError::Validation(
            "At least one apartment is required".to_string(),
        ));
    }
    if body.description.trim().is_empty() {
        return Err(AppError::Validation(
            "Description must not be empty".to_string(),
        ));
    }

    let items: Vec<(Uuid, Uuid, Decimal)> = body
        .items
        .iter()
        .map(|item| (item.apartment_id, item.resident_id, item.amount))
        .collect();

    let created = state
        .db
        .bulk_create_charges(
            syndic_id,
            body.building_id,
            &body.description,
            body.due_date,
            &items,
        )
        .await?;

    for _ in 0..created {
        record_charge_created(&syndic_id.to_string());
    }

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            format!("{} charges created", created),
            BulkCreateChargesResponse { created },
        )),
    ))
}

#[derive(Debug, Deserialize)]
pub struct ListChargesQuery {
    pub status: Option<String>,
    pub building_id: Option<Uuid>,
    pub apartment_id: Option<Uuid>,
    #[serde(default)]
    pub overdue: bool,
    pub syndic_id: Option<Uuid>,
}

pub async fn list_charges(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListChargesQuery>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Syndic)?;
    let syndic_id = resolve_syndic(&principal, params.syndic_id);

    let status = params
        .status
        .as_deref()
        .map(parse_charge_status)
        .transpose()?;

    let charges = state
        .db
        .list_charges_for_syndic(
            syndic_id,
            &ListChargesFilter {
                status,
                building_id: params.building_id,
                apartment_id: params.apartment_id,
                overdue_only: params.overdue,
            },
        )
        .await?;

    Ok(Json(ApiResponse::data(charges)))
}

pub async fn charge_statistics(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<ListChargesQuery>,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Syndic)?;
    let syndic_id = resolve_syndic(&principal, params.syndic_id);

    let stats = state.db.charge_statistics(syndic_id).await?;

    Ok(Json(ApiResponse::data(stats)))
}

pub async fn delete_charge(
    State(state): State<AppState>,
    principal: Principal,
    Path(charge_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let charge = state
        .db
        .get_charge(charge_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Charge not found".to_string()))?;

    if !principal.can_act_for_syndic(charge.syndic_id) {
        return Err(AppError::Ownership(
            "You do not manage this charge".to_string(),
        ));
    }

    state.db.delete_charge(charge_id).await?;

    Ok(Json(ApiResponse::message("Charge deleted")))
}

/// Resident view of their own charges, across all assigned apartments.
pub async fn list_my_charges(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<impl IntoResponse, AppError> {
    principal.require(Role::Resident)?;

    let charges = state.db.list_charges_for_resident(principal.user_id).await?;

    Ok(Json(ApiResponse::data(charges)))
}

fn resolve_syndic(principal: &Principal, requested: Option<Uuid>) -> Uuid {
    match requested {
        Some(id) if principal.is_admin() => id,
        _ => principal.user_id,
    }
}

fn parse_charge_status(s: &str) -> Result<ChargeStatus, AppError> {
    match s {
        "unpaid" => Ok(ChargeStatus::Unpaid),
        "partially_paid" => Ok(ChargeStatus::PartiallyPaid),
        "paid" => Ok(ChargeStatus::Paid),
        other => Err(AppError::Validation(format!(
            "Unknown charge status filter: {}",
            other
        ))),
    }
}
