use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::request::{IssueType, Priority, RequestStatus, ServiceRequest};

#[async_trait]
pub trait PricingService: Send + Sync {
    async fn quote(&self, request: &ServiceRequest, mechanic_id: Uuid) -> Result<f64, AppError>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn request_completed(&self, request: &ServiceRequest) -> Result<(), AppError>;

    async fn payment_succeeded(&self, request: &ServiceRequest) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestAccepted,
    StatusChanged,
    RequestCompleted,
    RequestCancelled,
    PaymentReceived,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub recipient_id: Uuid,
    pub kind: NotificationKind,
    pub request_id: Uuid,
    pub status: RequestStatus,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), AppError>;
}

/// Flat tariff per issue category scaled by priority.
pub struct TariffPricing;

impl TariffPricing {
    fn base_rate(issue_type: IssueType) -> f64 {
        match issue_type {
            IssueType::FlatTire => 400.0,
            IssueType::DeadBattery => 500.0,
            IssueType::Lockout => 600.0,
            IssueType::EngineTrouble => 1_200.0,
            IssueType::Accident => 2_000.0,
            IssueType::Other => 700.0,
        }
    }

    fn priority_multiplier(priority: Priority) -> f64 {
        match priority {
            Priority::Low => 0.9,
            Priority::Medium => 1.0,
            Priority::High => 1.2,
            Priority::Emergency => 1.5,
        }
    }
}

#[async_trait]
impl PricingService for TariffPricing {
    async fn quote(&self, request: &ServiceRequest, _mechanic_id: Uuid) -> Result<f64, AppError> {
        Ok(Self::base_rate(request.issue_type) * Self::priority_multiplier(request.priority))
    }
}

pub struct LoggingPaymentGateway;

#[async_trait]
impl PaymentGateway for LoggingPaymentGateway {
    async fn request_completed(&self, request: &ServiceRequest) -> Result<(), AppError> {
        info!(
            request_id = %request.id,
            amount = request.final_amount.or(request.quotation).unwrap_or_default(),
            "payment collaborator informed of completion"
        );
        Ok(())
    }

    async fn payment_succeeded(&self, request: &ServiceRequest) -> Result<(), AppError> {
        info!(
            request_id = %request.id,
            transaction_ref = request.transaction_ref.as_deref().unwrap_or(""),
            "payment collaborator informed of settlement"
        );
        Ok(())
    }
}

pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), AppError> {
        info!(
            recipient_id = %notification.recipient_id,
            request_id = %notification.request_id,
            kind = ?notification.kind,
            status = %notification.status,
            "notification queued"
        );
        Ok(())
    }
}
