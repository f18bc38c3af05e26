use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::actor::Caller;
use crate::engine::dispatch::DispatchReport;
use crate::engine::state_machine::{Completion, RequestFilter, RequestPage};
use crate::error::AppError;
use crate::models::actor::Role;
use crate::models::request::{NewRequest, PartUsed, RequestStatus, ServiceRequest};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/accept", patch(accept_request))
        .route("/requests/:id/status", patch(update_status))
        .route("/requests/:id/complete", patch(complete_request))
        .route("/requests/:id/cancel", patch(cancel_request))
        .route("/requests/:id/payment", patch(settle_payment))
        .route("/requests/:id/redispatch", post(redispatch))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
    pub estimated_arrival_minutes: Option<u32>,
    pub quotation: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub target_status: RequestStatus,
    pub note: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteBody {
    pub work_summary: Option<String>,
    pub final_amount: Option<f64>,
    #[serde(default)]
    pub parts_used: Vec<PartUsed>,
}

#[derive(Deserialize)]
pub struct CancelBody {
    #[serde(default)]
    pub reason: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBody {
    #[serde(default)]
    pub transaction_ref: String,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Json(payload): Json<NewRequest>,
) -> Result<(StatusCode, Json<ServiceRequest>), AppError> {
    let request = state.lifecycle.create_request(&actor, payload).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// Customers only ever see their own requests. Mechanics see the open pool
/// plus whatever is assigned to them.
async fn list_requests(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Query(mut filter): Query<RequestFilter>,
) -> Json<RequestPage> {
    match actor.role {
        Role::Customer => filter.customer_id = Some(actor.id),
        Role::Mechanic if filter.status != Some(RequestStatus::Pending) => {
            filter.mechanic_id = Some(actor.id)
        }
        _ => {}
    }
    Json(state.lifecycle.list_requests(&filter))
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state.lifecycle.get_request(id)?;
    let visible = actor.is_admin()
        || request.is_party(actor.id)
        || (actor.role == Role::Mechanic && request.status == RequestStatus::Pending);
    if !visible {
        return Err(AppError::Forbidden(format!(
            "request {id} is not visible to this user"
        )));
    }
    Ok(Json(request))
}

async fn accept_request(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<AcceptBody>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state
        .lifecycle
        .accept_request(
            &actor,
            id,
            payload.estimated_arrival_minutes,
            payload.quotation,
        )
        .await?;
    Ok(Json(request))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusBody>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state
        .lifecycle
        .update_status(&actor, id, payload.target_status, payload.note)
        .await?;
    Ok(Json(request))
}

async fn complete_request(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteBody>,
) -> Result<Json<ServiceRequest>, AppError> {
    let completion = Completion {
        work_summary: payload.work_summary,
        final_amount: payload.final_amount,
        parts_used: payload.parts_used,
    };
    let request = state
        .lifecycle
        .complete_request(&actor, id, completion)
        .await?;
    Ok(Json(request))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelBody>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state
        .lifecycle
        .cancel_request(&actor, id, payload.reason)
        .await?;
    Ok(Json(request))
}

async fn settle_payment(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<PaymentBody>,
) -> Result<Json<ServiceRequest>, AppError> {
    let request = state
        .lifecycle
        .settle_payment(&actor, id, payload.transaction_ref)
        .await?;
    Ok(Json(request))
}

async fn redispatch(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchReport>, AppError> {
    Ok(Json(state.lifecycle.redispatch(&actor, id)?))
}
