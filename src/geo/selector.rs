use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::haversine_km;
use crate::models::location::GeoPoint;
use crate::models::mechanic::Mechanic;

#[derive(Debug, Clone, Copy)]
pub struct RadiusBounds {
    pub min_km: f64,
    pub max_km: f64,
}

impl RadiusBounds {
    pub fn contains(&self, radius_km: f64) -> bool {
        (self.min_km..=self.max_km).contains(&radius_km)
    }

    pub fn clamp(&self, radius_km: f64) -> f64 {
        radius_km.clamp(self.min_km, self.max_km)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Distance,
    Rating,
    CompletedJobs,
    Name,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateFilters {
    pub min_rating: Option<f64>,
    pub text: Option<String>,
    /// Skip mechanics already holding a request. Broadcasts set this; the
    /// directory preview leaves it off.
    pub require_available: bool,
    pub sort: SortKey,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MechanicRef {
    pub mechanic_id: Uuid,
    pub name: String,
    pub distance_km: f64,
    pub rating: f64,
    pub completed_jobs: u32,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum ExclusionReason {
    NoLocation,
    #[serde(rename_all = "camelCase")]
    OutOfRange { distance_km: f64 },
    NotVerified,
    Inactive,
    Busy,
    BelowRating,
    NoTextMatch,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exclusion {
    pub mechanic_id: Uuid,
    #[serde(flatten)]
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSelection {
    pub radius_km: f64,
    pub candidates: Vec<MechanicRef>,
    pub excluded: Vec<Exclusion>,
}

pub fn find_candidates<'a, I>(
    mechanics: I,
    origin: GeoPoint,
    radius_km: f64,
    bounds: RadiusBounds,
    filters: &CandidateFilters,
) -> Result<CandidateSelection, AppError>
where
    I: IntoIterator<Item = &'a Mechanic>,
{
    if !origin.is_valid() {
        return Err(AppError::Validation(format!(
            "invalid origin ({}, {})",
            origin.lat, origin.lng
        )));
    }
    if !radius_km.is_finite() {
        return Err(AppError::Validation("radius must be a finite number".to_string()));
    }

    let radius_km = bounds.clamp(radius_km);
    let needle = filters
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase);

    let mut candidates = Vec::new();
    let mut excluded = Vec::new();

    for mechanic in mechanics {
        match evaluate(mechanic, &origin, radius_km, filters, needle.as_deref()) {
            Ok(distance_km) => candidates.push(MechanicRef {
                mechanic_id: mechanic.id,
                name: mechanic.name.clone(),
                distance_km,
                rating: mechanic.rating,
                completed_jobs: mechanic.completed_jobs,
                available: mechanic.is_available(),
            }),
            Err(reason) => excluded.push(Exclusion {
                mechanic_id: mechanic.id,
                reason,
            }),
        }
    }

    candidates.sort_by(|a, b| compare(filters.sort, a, b));
    excluded.sort_by_key(|exclusion| exclusion.mechanic_id);

    Ok(CandidateSelection {
        radius_km,
        candidates,
        excluded,
    })
}

fn evaluate(
    mechanic: &Mechanic,
    origin: &GeoPoint,
    radius_km: f64,
    filters: &CandidateFilters,
    needle: Option<&str>,
) -> Result<f64, ExclusionReason> {
    if !mechanic.verified {
        return Err(ExclusionReason::NotVerified);
    }
    if !mechanic.active {
        return Err(ExclusionReason::Inactive);
    }
    if filters.require_available && !mechanic.is_available() {
        return Err(ExclusionReason::Busy);
    }
    if let Some(floor) = filters.min_rating {
        if mechanic.rating < floor {
            return Err(ExclusionReason::BelowRating);
        }
    }
    if let Some(needle) = needle {
        let matches = mechanic.name.to_lowercase().contains(needle)
            || mechanic
                .specialties
                .iter()
                .any(|specialty| specialty.to_lowercase().contains(needle));
        if !matches {
            return Err(ExclusionReason::NoTextMatch);
        }
    }

    let location = mechanic.location.ok_or(ExclusionReason::NoLocation)?;
    let distance_km = haversine_km(origin, &location);
    if distance_km > radius_km {
        return Err(ExclusionReason::OutOfRange { distance_km });
    }

    Ok(distance_km)
}

fn compare(sort: SortKey, a: &MechanicRef, b: &MechanicRef) -> Ordering {
    let primary = match sort {
        SortKey::Distance => a.distance_km.total_cmp(&b.distance_km),
        SortKey::Rating => b.rating.total_cmp(&a.rating),
        SortKey::CompletedJobs => b.completed_jobs.cmp(&a.completed_jobs),
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    };
    primary.then_with(|| a.mechanic_id.cmp(&b.mechanic_id))
}
