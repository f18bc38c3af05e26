use chrono::Utc;
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::location::GeoPoint;
use crate::models::mechanic::Mechanic;

/// Registration input for a mechanic.
#[derive(Debug, Clone)]
pub struct MechanicProfile {
    pub name: String,
    pub location: Option<GeoPoint>,
    pub rating: f64,
    pub specialties: Vec<String>,
}

/// In-memory mechanic directory.
///
/// Profile and location writes go through here. `active_request_id` is only
/// reachable through [`MechanicDirectory::entry_mut`], which is crate-private
/// and used by the state machine while it holds the request entry.
#[derive(Default)]
pub struct MechanicDirectory {
    entries: DashMap<Uuid, Mechanic>,
}

impl MechanicDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, profile: MechanicProfile) -> Result<Mechanic, AppError> {
        if profile.name.trim().is_empty() {
            return Err(AppError::Validation("name cannot be empty".to_string()));
        }
        if let Some(location) = &profile.location {
            if !location.is_valid() {
                return Err(AppError::Validation("location is not a valid lat/lng".to_string()));
            }
        }

        let mechanic = Mechanic {
            id: Uuid::new_v4(),
            name: profile.name.trim().to_string(),
            location: profile.location,
            verified: false,
            active: true,
            rating: profile.rating.clamp(0.0, 5.0),
            specialties: profile.specialties,
            completed_jobs: 0,
            active_request_id: None,
            updated_at: Utc::now(),
        };

        self.entries.insert(mechanic.id, mechanic.clone());
        Ok(mechanic)
    }

    pub fn get(&self, id: &Uuid) -> Option<Mechanic> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point-in-time copy of every entry, ordered by id.
    pub fn snapshot(&self) -> Vec<Mechanic> {
        let mut mechanics: Vec<Mechanic> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        mechanics.sort_by_key(|mechanic| mechanic.id);
        mechanics
    }

    pub fn update_location(&self, id: &Uuid, location: GeoPoint) -> Result<Mechanic, AppError> {
        if !location.is_valid() {
            return Err(AppError::Validation("location is not a valid lat/lng".to_string()));
        }

        let mut mechanic = self
            .entries
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("mechanic {id} not found")))?;

        mechanic.location = Some(location);
        mechanic.updated_at = Utc::now();
        Ok(mechanic.clone())
    }

    pub fn set_verification(
        &self,
        id: &Uuid,
        verified: Option<bool>,
        active: Option<bool>,
    ) -> Result<Mechanic, AppError> {
        let mut mechanic = self
            .entries
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("mechanic {id} not found")))?;

        if let Some(verified) = verified {
            mechanic.verified = verified;
        }
        if let Some(active) = active {
            mechanic.active = active;
        }
        mechanic.updated_at = Utc::now();
        Ok(mechanic.clone())
    }

    pub(crate) fn entry_mut(&self, id: &Uuid) -> Option<RefMut<'_, Uuid, Mechanic>> {
        self.entries.get_mut(id)
    }
}
