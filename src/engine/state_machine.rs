use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::directory::MechanicDirectory;
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::request::{PartUsed, PaymentStatus, RequestStatus, ServiceRequest};

#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub work_summary: Option<String>,
    pub final_amount: Option<f64>,
    pub parts_used: Vec<PartUsed>,
}

#[derive(Debug, Clone)]
enum Details {
    None,
    Claim {
        estimated_arrival_minutes: Option<u32>,
        quotation: Option<f64>,
    },
    Complete(Completion),
    Cancel {
        reason: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Transitioned {
    pub request: ServiceRequest,
    pub from: RequestStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub mechanic_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPage {
    pub items: Vec<ServiceRequest>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
}

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

/// Lock order is always the request entry, then the mechanic entry.
pub struct StateMachine {
    requests: DashMap<Uuid, ServiceRequest>,
    directory: Arc<MechanicDirectory>,
}

impl StateMachine {
    pub fn new(directory: Arc<MechanicDirectory>) -> Self {
        Self {
            requests: DashMap::new(),
            directory,
        }
    }

    pub fn insert(&self, request: ServiceRequest) -> ServiceRequest {
        self.requests.insert(request.id, request.clone());
        request
    }

    pub fn get(&self, id: &Uuid) -> Option<ServiceRequest> {
        self.requests.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Newest first.
    pub fn list(&self, filter: &RequestFilter) -> RequestPage {
        let limit = filter
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let page = filter.page.unwrap_or(1).max(1);

        let mut matching: Vec<ServiceRequest> = self
            .requests
            .iter()
            .filter(|entry| {
                let request = entry.value();
                filter.status.is_none_or(|status| request.status == status)
                    && filter
                        .customer_id
                        .is_none_or(|customer| request.customer_id == customer)
                    && filter
                        .mechanic_id
                        .is_none_or(|mechanic| request.assigned_mechanic_id == Some(mechanic))
            })
            .map(|entry| entry.value().clone())
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect();

        RequestPage {
            items,
            total,
            page,
            limit,
        }
    }

    /// Non-terminal requests the user is a party to, used to rebuild room
    /// membership when a session connects.
    pub fn open_requests_for(&self, user_id: Uuid) -> Vec<Uuid> {
        let mut ids: Vec<Uuid> = self
            .requests
            .iter()
            .filter(|entry| !entry.status.is_terminal() && entry.is_party(user_id))
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids
    }

    pub fn transition(
        &self,
        request_id: Uuid,
        target: RequestStatus,
        actor: &Actor,
        note: Option<String>,
    ) -> Result<Transitioned, AppError> {
        let details = match target {
            RequestStatus::Assigned => Details::Claim {
                estimated_arrival_minutes: None,
                quotation: None,
            },
            RequestStatus::Completed => Details::Complete(Completion::default()),
            RequestStatus::Cancelled => Details::Cancel {
                reason: note.clone(),
            },
            _ => Details::None,
        };
        self.apply(request_id, target, actor, note, details)
    }

    pub fn claim(
        &self,
        request_id: Uuid,
        actor: &Actor,
        estimated_arrival_minutes: Option<u32>,
        quotation: Option<f64>,
    ) -> Result<Transitioned, AppError> {
        let note = estimated_arrival_minutes.map(|eta| format!("eta {eta} min"));
        self.apply(
            request_id,
            RequestStatus::Assigned,
            actor,
            note,
            Details::Claim {
                estimated_arrival_minutes,
                quotation,
            },
        )
    }

    pub fn complete(
        &self,
        request_id: Uuid,
        actor: &Actor,
        completion: Completion,
    ) -> Result<Transitioned, AppError> {
        let note = completion.work_summary.clone();
        self.apply(
            request_id,
            RequestStatus::Completed,
            actor,
            note,
            Details::Complete(completion),
        )
    }

    pub fn cancel(
        &self,
        request_id: Uuid,
        actor: &Actor,
        reason: String,
    ) -> Result<Transitioned, AppError> {
        self.apply(
            request_id,
            RequestStatus::Cancelled,
            actor,
            Some(reason.clone()),
            Details::Cancel {
                reason: Some(reason),
            },
        )
    }

    /// Sets the quotation after a claim when the mechanic did not send one.
    /// Appends no history; only the assigned mechanic's still-open request
    /// without a quotation is touched.
    pub fn record_quotation(
        &self,
        request_id: Uuid,
        mechanic_id: Uuid,
        amount: f64,
    ) -> Result<ServiceRequest, AppError> {
        let mut entry = self
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| not_found(request_id))?;

        if entry.assigned_mechanic_id != Some(mechanic_id) {
            return Err(AppError::Forbidden(format!(
                "request {request_id} is not assigned to mechanic {mechanic_id}"
            )));
        }
        if entry.status.holds_assignment() && entry.quotation.is_none() {
            entry.quotation = Some(amount);
        }
        Ok(entry.clone())
    }

    pub fn settle_payment(
        &self,
        request_id: Uuid,
        actor: &Actor,
        transaction_ref: String,
    ) -> Result<ServiceRequest, AppError> {
        let mut entry = self
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| not_found(request_id))?;

        if entry.customer_id != actor.id && !actor.is_admin() {
            return Err(AppError::Forbidden(format!(
                "request {request_id} belongs to another customer"
            )));
        }
        if entry.status != RequestStatus::Completed {
            return Err(AppError::Validation(format!(
                "request {request_id} is {} and cannot be paid yet",
                entry.status
            )));
        }
        if entry.payment_status == PaymentStatus::Paid {
            return Err(AppError::Validation(format!(
                "request {request_id} is already paid"
            )));
        }

        entry.payment_status = PaymentStatus::Paid;
        entry.transaction_ref = Some(transaction_ref);
        entry.paid_at = Some(chrono::Utc::now());
        info!(request_id = %request_id, "payment settled");
        Ok(entry.clone())
    }

    fn apply(
        &self,
        request_id: Uuid,
        target: RequestStatus,
        actor: &Actor,
        note: Option<String>,
        details: Details,
    ) -> Result<Transitioned, AppError> {
        let mut entry = self
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| not_found(request_id))?;
        let request = entry.value_mut();
        let from = request.status;

        match details {
            Details::Claim {
                estimated_arrival_minutes,
                quotation,
            } => {
                self.assign(request, actor, estimated_arrival_minutes, quotation, note)?;
            }
            other => {
                authorize(request, actor, target)?;
                if !from.can_transition_to(target) {
                    return Err(AppError::InvalidTransition { from, to: target });
                }

                match other {
                    Details::Complete(completion) => {
                        request.work_summary = completion.work_summary;
                        request.final_amount = completion.final_amount;
                        request.parts_used = completion.parts_used;
                        let completed_at = request.push_status(target, actor.id, note);
                        request.work_duration_minutes = request
                            .started_at
                            .map(|started| (completed_at - started).num_minutes());
                        self.release(request, true);
                    }
                    Details::Cancel { reason } => {
                        request.cancellation_reason = reason;
                        request.cancelled_by = Some(actor.id);
                        request.push_status(target, actor.id, note);
                        self.release(request, false);
                    }
                    Details::None | Details::Claim { .. } => {
                        request.push_status(target, actor.id, note);
                    }
                }
            }
        }

        info!(
            request_id = %request_id,
            from = %from,
            to = %target,
            actor_id = %actor.id,
            "request transitioned"
        );

        Ok(Transitioned {
            request: request.clone(),
            from,
        })
    }

    fn assign(
        &self,
        request: &mut ServiceRequest,
        actor: &Actor,
        estimated_arrival_minutes: Option<u32>,
        quotation: Option<f64>,
        note: Option<String>,
    ) -> Result<(), AppError> {
        if actor.role != Role::Mechanic {
            return Err(AppError::Forbidden(
                "only mechanics can accept requests".to_string(),
            ));
        }

        if request.status != RequestStatus::Pending {
            return Err(match request.assigned_mechanic_id {
                _ if request.status == RequestStatus::Cancelled => AppError::NoLongerPending {
                    request_id: request.id,
                    status: request.status,
                },
                Some(holder) if holder != actor.id => AppError::AlreadyClaimed {
                    request_id: request.id,
                },
                Some(_) => AppError::InvalidTransition {
                    from: request.status,
                    to: RequestStatus::Assigned,
                },
                None => AppError::NoLongerPending {
                    request_id: request.id,
                    status: request.status,
                },
            });
        }

        let mut mechanic = self
            .directory
            .entry_mut(&actor.id)
            .ok_or_else(|| AppError::NotFound(format!("mechanic {} not found", actor.id)))?;

        if !mechanic.verified || !mechanic.active {
            return Err(AppError::Forbidden(format!(
                "mechanic {} is not verified and active",
                actor.id
            )));
        }
        if !mechanic.is_available() {
            return Err(AppError::MechanicUnavailable {
                mechanic_id: actor.id,
            });
        }

        mechanic.active_request_id = Some(request.id);
        mechanic.updated_at = chrono::Utc::now();

        request.assigned_mechanic_id = Some(actor.id);
        request.estimated_arrival_minutes = estimated_arrival_minutes;
        request.quotation = quotation;
        request.push_status(RequestStatus::Assigned, actor.id, note);
        Ok(())
    }

    fn release(&self, request: &ServiceRequest, job_done: bool) {
        let Some(mechanic_id) = request.assigned_mechanic_id else {
            return;
        };
        if let Some(mut mechanic) = self.directory.entry_mut(&mechanic_id) {
            if mechanic.active_request_id == Some(request.id) {
                mechanic.active_request_id = None;
            }
            if job_done {
                mechanic.completed_jobs = mechanic.completed_jobs.saturating_add(1);
            }
            mechanic.updated_at = chrono::Utc::now();
        }
    }
}

/// Who may drive a request to `target`, checked inside the transition lock.
fn authorize(request: &ServiceRequest, actor: &Actor, target: RequestStatus) -> Result<(), AppError> {
    let is_assigned = request.assigned_mechanic_id == Some(actor.id);

    let permitted = match target {
        RequestStatus::Cancelled => {
            actor.is_admin()
                || is_assigned
                || (request.customer_id == actor.id
                    && request.status != RequestStatus::InProgress)
        }
        _ => is_assigned,
    };

    if permitted {
        Ok(())
    } else if target == RequestStatus::Cancelled && request.customer_id == actor.id {
        Err(AppError::Forbidden(
            "work already in progress can only be cancelled by the mechanic".to_string(),
        ))
    } else {
        Err(AppError::Forbidden(format!(
            "request {} is not yours to move to {target}",
            request.id
        )))
    }
}

fn not_found(request_id: Uuid) -> AppError {
    AppError::NotFound(format!("request {request_id} not found"))
}
