//! Event names and payloads carried over the live channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::GeoPoint;
use crate::models::request::{PaymentStatus, RequestStatus, ServiceRequest};

pub const NEW_REQUEST_AVAILABLE: &str = "new-request-available";
pub const REQUEST_TAKEN: &str = "request-taken";
pub const REQUEST_ACCEPTED: &str = "request-accepted";
pub const REQUEST_UPDATED: &str = "request_updated";
pub const LOCATION_UPDATED: &str = "location_updated";
pub const ERROR: &str = "error";

/// Frame pushed to a session: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl OutboundEvent {
    pub fn new<T: Serialize>(event: &str, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event: event.to_string(),
            data: serde_json::to_value(payload)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTaken {
    pub request_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUpdated {
    pub request_id: Uuid,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<RequestStatus>,
    pub customer_id: Uuid,
    pub mechanic_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub at: DateTime<Utc>,
    pub estimated_arrival_minutes: Option<u32>,
    pub quotation: Option<f64>,
    pub final_amount: Option<f64>,
    pub work_duration_minutes: Option<i64>,
    pub payment_status: PaymentStatus,
}

impl RequestUpdated {
    pub fn from_request(request: &ServiceRequest, previous_status: Option<RequestStatus>) -> Self {
        let last = request.history.last();
        Self {
            request_id: request.id,
            status: request.status,
            previous_status,
            customer_id: request.customer_id,
            mechanic_id: request.assigned_mechanic_id,
            note: last.and_then(|change| change.note.clone()),
            at: last.map(|change| change.at).unwrap_or(request.created_at),
            estimated_arrival_minutes: request.estimated_arrival_minutes,
            quotation: request.quotation,
            final_amount: request.final_amount,
            work_duration_minutes: request.work_duration_minutes,
            payment_status: request.payment_status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdated {
    pub mechanic_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}

/// Frames accepted from a connected client.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinRequest { request_id: Uuid },
    #[serde(rename_all = "camelCase")]
    LeaveRequest { request_id: Uuid },
    UpdateLocation {
        lat: f64,
        lng: f64,
        #[serde(default)]
        accuracy: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    JoinMechanicArea {
        mechanic_id: Uuid,
        location: GeoPoint,
    },
    LeaveMechanicArea,
}
