use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;

/// Dispatch-relevant slice of a mechanic's account.
///
/// `active_request_id` is written only by the request state machine. The
/// `available` flag is never stored; it is derived from that field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mechanic {
    pub id: Uuid,
    pub name: String,
    pub location: Option<GeoPoint>,
    pub verified: bool,
    pub active: bool,
    pub rating: f64,
    pub specialties: Vec<String>,
    pub completed_jobs: u32,
    pub active_request_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl Mechanic {
    pub fn is_available(&self) -> bool {
        self.active_request_id.is_none()
    }

    pub fn view(&self) -> MechanicView {
        MechanicView {
            mechanic: self.clone(),
            available: self.is_available(),
        }
    }
}

/// Wire form of a mechanic with the derived availability flag spelled out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MechanicView {
    #[serde(flatten)]
    pub mechanic: Mechanic,
    pub available: bool,
}
