use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::actor::Caller;
use crate::engine::directory::MechanicProfile;
use crate::error::AppError;
use crate::geo::selector::{find_candidates, CandidateFilters, CandidateSelection, SortKey};
use crate::models::location::GeoPoint;
use crate::models::mechanic::MechanicView;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mechanics", post(register_mechanic).get(list_mechanics))
        .route("/mechanics/nearby", get(nearby_mechanics))
        .route("/mechanics/:id", get(get_mechanic))
        .route("/mechanics/:id/location", patch(update_mechanic_location))
        .route("/mechanics/:id/verification", patch(update_verification))
}

#[derive(Deserialize)]
pub struct RegisterMechanicRequest {
    pub name: String,
    pub location: Option<GeoPoint>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub specialties: Vec<String>,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
    pub accuracy: Option<f64>,
}

#[derive(Deserialize)]
pub struct UpdateVerificationRequest {
    pub verified: Option<bool>,
    pub active: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
    #[serde(default)]
    pub sort: SortKey,
    pub min_rating: Option<f64>,
    pub q: Option<String>,
}

async fn register_mechanic(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterMechanicRequest>,
) -> Result<(StatusCode, Json<MechanicView>), AppError> {
    let mechanic = state.directory.register(MechanicProfile {
        name: payload.name,
        location: payload.location,
        rating: payload.rating,
        specialties: payload.specialties,
    })?;
    Ok((StatusCode::CREATED, Json(mechanic.view())))
}

async fn list_mechanics(State(state): State<Arc<AppState>>) -> Json<Vec<MechanicView>> {
    let mechanics = state
        .directory
        .snapshot()
        .iter()
        .map(|mechanic| mechanic.view())
        .collect();
    Json(mechanics)
}

async fn get_mechanic(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<MechanicView>, AppError> {
    let mechanic = state
        .directory
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("mechanic {id} not found")))?;
    Ok(Json(mechanic.view()))
}

/// Same selection a broadcast would run, without the availability cut, so
/// the caller can see why each mechanic was or was not picked.
async fn nearby_mechanics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<CandidateSelection>, AppError> {
    let filters = CandidateFilters {
        min_rating: query.min_rating,
        text: query.q,
        require_available: false,
        sort: query.sort,
    };
    let snapshot = state.directory.snapshot();
    let selection = find_candidates(
        snapshot.iter(),
        GeoPoint::new(query.lat, query.lng),
        query.radius_km.unwrap_or(state.config.default_radius_km),
        state.config.radius_bounds(),
        &filters,
    )?;
    Ok(Json(selection))
}

async fn update_mechanic_location(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<MechanicView>, AppError> {
    if actor.id != id && !actor.is_admin() {
        return Err(AppError::Forbidden(
            "mechanics can only move themselves".to_string(),
        ));
    }
    let mechanic = state.broadcaster.relay_location(
        &id,
        GeoPoint::new(payload.lat, payload.lng),
        payload.accuracy,
    )?;
    Ok(Json(mechanic.view()))
}

async fn update_verification(
    State(state): State<Arc<AppState>>,
    Caller(actor): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateVerificationRequest>,
) -> Result<Json<MechanicView>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "only admins can change verification".to_string(),
        ));
    }
    let mechanic = state
        .directory
        .set_verification(&id, payload.verified, payload.active)?;
    Ok(Json(mechanic.view()))
}
