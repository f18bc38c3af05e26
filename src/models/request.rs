use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::RequestLocation;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    FlatTire,
    DeadBattery,
    EngineTrouble,
    Lockout,
    Accident,
    Other,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Emergency,
}

/// Lifecycle status of a service request. The transition table lives in
/// [`RequestStatus::allowed_targets`] and nowhere else.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Assigned,
    Enroute,
    InProgress,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 6] = [
        RequestStatus::Pending,
        RequestStatus::Assigned,
        RequestStatus::Enroute,
        RequestStatus::InProgress,
        RequestStatus::Completed,
        RequestStatus::Cancelled,
    ];

    pub fn allowed_targets(self) -> &'static [RequestStatus] {
        use RequestStatus::*;
        match self {
            Pending => &[Assigned, Cancelled],
            Assigned => &[Enroute, Cancelled],
            Enroute => &[InProgress, Cancelled],
            InProgress => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: RequestStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    /// Statuses during which a mechanic is attached to the request.
    pub fn holds_assignment(self) -> bool {
        matches!(
            self,
            RequestStatus::Assigned | RequestStatus::Enroute | RequestStatus::InProgress
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Enroute => "enroute",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        RequestStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == raw)
            .ok_or_else(|| format!("unknown status: {raw}"))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfo {
    pub vehicle_type: String,
    pub model: String,
    pub plate_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartUsed {
    pub name: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub status: RequestStatus,
    pub at: DateTime<Utc>,
    pub actor_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub assigned_mechanic_id: Option<Uuid>,

    pub issue_type: IssueType,
    pub description: String,
    pub vehicle_info: VehicleInfo,
    pub images: Vec<String>,

    pub location: RequestLocation,
    pub radius_km: f64,

    pub estimated_arrival_minutes: Option<u32>,
    pub quotation: Option<f64>,
    pub final_amount: Option<f64>,
    pub work_summary: Option<String>,
    pub parts_used: Vec<PartUsed>,
    pub work_duration_minutes: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub payment_status: PaymentStatus,
    pub transaction_ref: Option<String>,

    pub status: RequestStatus,
    pub priority: Priority,
    pub history: Vec<StatusChange>,

    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Everything a customer supplies when raising a request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub issue_type: Option<IssueType>,
    #[serde(default)]
    pub description: String,
    pub vehicle_info: Option<VehicleInfo>,
    pub location: Option<RequestLocation>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub radius_km: Option<f64>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// A [`NewRequest`] that passed validation.
#[derive(Debug, Clone)]
pub struct RequestDraft {
    pub issue_type: IssueType,
    pub description: String,
    pub vehicle_info: VehicleInfo,
    pub location: RequestLocation,
    pub radius_km: f64,
    pub priority: Priority,
    pub images: Vec<String>,
}

impl ServiceRequest {
    /// Builds a request in `pending` with its opening history entry.
    pub fn open(customer_id: Uuid, draft: RequestDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            assigned_mechanic_id: None,
            issue_type: draft.issue_type,
            description: draft.description,
            vehicle_info: draft.vehicle_info,
            images: draft.images,
            location: draft.location,
            radius_km: draft.radius_km,
            estimated_arrival_minutes: None,
            quotation: None,
            final_amount: None,
            work_summary: None,
            parts_used: Vec::new(),
            work_duration_minutes: None,
            cancellation_reason: None,
            cancelled_by: None,
            payment_status: PaymentStatus::Unpaid,
            transaction_ref: None,
            status: RequestStatus::Pending,
            priority: draft.priority,
            history: vec![StatusChange {
                status: RequestStatus::Pending,
                at: now,
                actor_id: customer_id,
                note: Some("request created".to_string()),
            }],
            created_at: now,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
            paid_at: None,
        }
    }

    /// Appends one history entry and moves `status` with it. Timestamps never
    /// go backwards even if the wall clock does.
    pub(crate) fn push_status(
        &mut self,
        status: RequestStatus,
        actor_id: Uuid,
        note: Option<String>,
    ) -> DateTime<Utc> {
        let mut at = Utc::now();
        if let Some(last) = self.history.last() {
            if at < last.at {
                at = last.at;
            }
        }

        self.history.push(StatusChange {
            status,
            at,
            actor_id,
            note,
        });
        self.status = status;

        match status {
            RequestStatus::Assigned => self.accepted_at = Some(at),
            RequestStatus::InProgress => self.started_at = Some(at),
            RequestStatus::Completed => self.completed_at = Some(at),
            RequestStatus::Cancelled => self.cancelled_at = Some(at),
            RequestStatus::Pending | RequestStatus::Enroute => {}
        }

        at
    }

    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.customer_id == user_id || self.assigned_mechanic_id == Some(user_id)
    }

    pub fn summary(&self, distance_km: Option<f64>) -> RequestSummary {
        RequestSummary {
            request_id: self.id,
            customer_id: self.customer_id,
            issue_type: self.issue_type,
            description: self.description.clone(),
            vehicle_info: self.vehicle_info.clone(),
            location: self.location.clone(),
            priority: self.priority,
            radius_km: self.radius_km,
            distance_km,
            created_at: self.created_at,
        }
    }
}

/// Payload of `new-request-available`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub request_id: Uuid,
    pub customer_id: Uuid,
    pub issue_type: IssueType,
    pub description: String,
    pub vehicle_info: VehicleInfo,
    pub location: RequestLocation,
    pub priority: Priority,
    pub radius_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    pub created_at: DateTime<Utc>,
}
