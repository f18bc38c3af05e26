use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::collaborators::{
    Notification, NotificationKind, Notifier, PaymentGateway, PricingService,
};
use crate::engine::dispatch::{DispatchBroadcaster, DispatchReport};
use crate::engine::state_machine::{Completion, RequestFilter, RequestPage, StateMachine};
use crate::error::AppError;
use crate::geo::selector::RadiusBounds;
use crate::models::actor::{Actor, Role};
use crate::models::request::{
    NewRequest, RequestDraft, RequestStatus, ServiceRequest, VehicleInfo,
};
use crate::observability::metrics::Metrics;

const MAX_DESCRIPTION_CHARS: usize = 2_000;
const MAX_IMAGES: usize = 10;
const MAX_ETA_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, Copy)]
pub struct LifecycleSettings {
    pub radius_bounds: RadiusBounds,
    pub default_radius_km: f64,
    pub collaborator_timeout: Duration,
    pub default_quotation: f64,
}

pub struct LifecycleOrchestrator {
    machine: Arc<StateMachine>,
    broadcaster: Arc<DispatchBroadcaster>,
    pricing: Arc<dyn PricingService>,
    payments: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    settings: LifecycleSettings,
    metrics: Metrics,
}

impl LifecycleOrchestrator {
    pub fn new(
        machine: Arc<StateMachine>,
        broadcaster: Arc<DispatchBroadcaster>,
        pricing: Arc<dyn PricingService>,
        payments: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        settings: LifecycleSettings,
        metrics: Metrics,
    ) -> Self {
        Self {
            machine,
            broadcaster,
            pricing,
            payments,
            notifier,
            settings,
            metrics,
        }
    }

    pub async fn create_request(
        &self,
        customer: &Actor,
        details: NewRequest,
    ) -> Result<ServiceRequest, AppError> {
        if customer.role != Role::Customer {
            return Err(AppError::Forbidden(
                "only customers can raise service requests".to_string(),
            ));
        }

        let draft = self.validate(details)?;
        let request = self.machine.insert(ServiceRequest::open(customer.id, draft));
        self.metrics.requests_created_total.inc();
        info!(
            request_id = %request.id,
            customer_id = %customer.id,
            issue_type = ?request.issue_type,
            "service request created"
        );

        if let Err(err) = self.broadcaster.dispatch(request.id) {
            warn!(request_id = %request.id, error = %err, "initial dispatch failed");
        }

        Ok(request)
    }

    pub async fn accept_request(
        &self,
        mechanic: &Actor,
        request_id: Uuid,
        estimated_arrival_minutes: Option<u32>,
        quotation: Option<f64>,
    ) -> Result<ServiceRequest, AppError> {
        if let Some(eta) = estimated_arrival_minutes {
            if eta > MAX_ETA_MINUTES {
                return Err(AppError::Validation(format!(
                    "estimatedArrivalMinutes must be at most {MAX_ETA_MINUTES}"
                )));
            }
        }
        if let Some(amount) = quotation {
            validate_amount("quotation", amount)?;
        }

        let mut request = self.broadcaster.resolve_claim(
            request_id,
            mechanic,
            estimated_arrival_minutes,
            quotation,
        )?;

        if request.quotation.is_none() {
            let amount = self.quote_or_default(&request, mechanic.id).await;
            match self.machine.record_quotation(request_id, mechanic.id, amount) {
                Ok(quoted) => {
                    request = quoted;
                    self.broadcaster.announce_update(&request, None);
                }
                Err(err) => {
                    warn!(request_id = %request_id, error = %err, "could not record quotation")
                }
            }
        }

        self.notify(request.customer_id, NotificationKind::RequestAccepted, &request)
            .await;
        Ok(request)
    }

    pub async fn update_status(
        &self,
        actor: &Actor,
        request_id: Uuid,
        target: RequestStatus,
        note: Option<String>,
    ) -> Result<ServiceRequest, AppError> {
        match target {
            RequestStatus::Assigned => Err(AppError::Validation(
                "requests are assigned by accepting them".to_string(),
            )),
            RequestStatus::Completed => {
                let completion = Completion {
                    work_summary: note,
                    ..Completion::default()
                };
                self.complete_request(actor, request_id, completion).await
            }
            RequestStatus::Cancelled => {
                let reason = note.unwrap_or_else(|| "cancelled".to_string());
                self.cancel_request(actor, request_id, reason).await
            }
            _ => {
                let moved = self
                    .machine
                    .transition(request_id, target, actor, clean(note))?;
                self.broadcaster
                    .announce_update(&moved.request, Some(moved.from));
                self.notify(
                    moved.request.customer_id,
                    NotificationKind::StatusChanged,
                    &moved.request,
                )
                .await;
                Ok(moved.request)
            }
        }
    }

    pub async fn complete_request(
        &self,
        mechanic: &Actor,
        request_id: Uuid,
        completion: Completion,
    ) -> Result<ServiceRequest, AppError> {
        if let Some(amount) = completion.final_amount {
            validate_amount("finalAmount", amount)?;
        }
        for part in &completion.parts_used {
            if part.name.trim().is_empty() {
                return Err(AppError::Validation("part name cannot be empty".to_string()));
            }
            validate_amount("part cost", part.cost)?;
        }
        let completion = Completion {
            work_summary: clean(completion.work_summary),
            ..completion
        };

        let done = self.machine.complete(request_id, mechanic, completion)?;
        let request = done.request;
        self.broadcaster.announce_update(&request, Some(done.from));

        self.best_effort(
            "payment",
            request.id,
            self.payments.request_completed(&request),
        )
        .await;
        self.notify(
            request.customer_id,
            NotificationKind::RequestCompleted,
            &request,
        )
        .await;

        info!(
            request_id = %request.id,
            work_duration_minutes = ?request.work_duration_minutes,
            "request completed"
        );
        Ok(request)
    }

    pub async fn cancel_request(
        &self,
        actor: &Actor,
        request_id: Uuid,
        reason: String,
    ) -> Result<ServiceRequest, AppError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(AppError::Validation("a cancellation reason is required".to_string()));
        }

        let cancelled = self.machine.cancel(request_id, actor, reason)?;
        let request = cancelled.request;
        self.broadcaster.announce_update(&request, Some(cancelled.from));

        if request.customer_id != actor.id {
            self.notify(
                request.customer_id,
                NotificationKind::RequestCancelled,
                &request,
            )
            .await;
        }
        if let Some(mechanic_id) = request.assigned_mechanic_id {
            if mechanic_id != actor.id {
                self.notify(mechanic_id, NotificationKind::RequestCancelled, &request)
                    .await;
            }
        }
        Ok(request)
    }

    pub async fn settle_payment(
        &self,
        customer: &Actor,
        request_id: Uuid,
        transaction_ref: String,
    ) -> Result<ServiceRequest, AppError> {
        let transaction_ref = transaction_ref.trim().to_string();
        if transaction_ref.is_empty() {
            return Err(AppError::Validation("transactionRef is required".to_string()));
        }

        let request = self
            .machine
            .settle_payment(request_id, customer, transaction_ref)?;
        self.broadcaster.announce_update(&request, None);

        self.best_effort(
            "payment",
            request.id,
            self.payments.payment_succeeded(&request),
        )
        .await;
        if let Some(mechanic_id) = request.assigned_mechanic_id {
            self.notify(mechanic_id, NotificationKind::PaymentReceived, &request)
                .await;
        }
        Ok(request)
    }

    /// Re-broadcasts a request that is still waiting for a mechanic.
    pub fn redispatch(&self, actor: &Actor, request_id: Uuid) -> Result<DispatchReport, AppError> {
        let request = self.get_request(request_id)?;
        if request.customer_id != actor.id && !actor.is_admin() {
            return Err(AppError::Forbidden(format!(
                "request {request_id} belongs to another customer"
            )));
        }
        self.broadcaster.dispatch(request.id)
    }

    pub fn get_request(&self, request_id: Uuid) -> Result<ServiceRequest, AppError> {
        self.machine
            .get(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))
    }

    pub fn list_requests(&self, filter: &RequestFilter) -> RequestPage {
        self.machine.list(filter)
    }

    fn validate(&self, details: NewRequest) -> Result<RequestDraft, AppError> {
        let issue_type = details
            .issue_type
            .ok_or_else(|| AppError::Validation("issueType is required".to_string()))?;

        let description = details.description.trim().to_string();
        if description.is_empty() {
            return Err(AppError::Validation("description is required".to_string()));
        }
        if description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(AppError::Validation(format!(
                "description must be at most {MAX_DESCRIPTION_CHARS} characters"
            )));
        }

        let vehicle_info = details
            .vehicle_info
            .ok_or_else(|| AppError::Validation("vehicleInfo is required".to_string()))?;
        validate_vehicle(&vehicle_info)?;

        let location = details
            .location
            .ok_or_else(|| AppError::Validation("location is required".to_string()))?;
        if !location.point().is_valid() {
            return Err(AppError::Validation("location is not a valid lat/lng".to_string()));
        }

        let radius_km = details.radius_km.unwrap_or(self.settings.default_radius_km);
        if !self.settings.radius_bounds.contains(radius_km) {
            return Err(AppError::Validation(format!(
                "radiusKm must be between {} and {}",
                self.settings.radius_bounds.min_km, self.settings.radius_bounds.max_km
            )));
        }

        if details.images.len() > MAX_IMAGES {
            return Err(AppError::Validation(format!(
                "at most {MAX_IMAGES} images may be attached"
            )));
        }
        if details.images.iter().any(|image| image.trim().is_empty()) {
            return Err(AppError::Validation("image references cannot be empty".to_string()));
        }

        Ok(RequestDraft {
            issue_type,
            description,
            vehicle_info,
            location,
            radius_km,
            priority: details.priority.unwrap_or_default(),
            images: details.images,
        })
    }

    async fn quote_or_default(&self, request: &ServiceRequest, mechanic_id: Uuid) -> f64 {
        match self
            .best_effort("pricing", request.id, self.pricing.quote(request, mechanic_id))
            .await
        {
            Some(amount) if amount.is_finite() && amount >= 0.0 => amount,
            Some(amount) => {
                warn!(request_id = %request.id, amount, "pricing returned an unusable amount");
                self.settings.default_quotation
            }
            None => self.settings.default_quotation,
        }
    }

    async fn notify(&self, recipient_id: Uuid, kind: NotificationKind, request: &ServiceRequest) {
        let notification = Notification {
            recipient_id,
            kind,
            request_id: request.id,
            status: request.status,
        };
        self.best_effort("notification", request.id, self.notifier.notify(notification))
            .await;
    }

    async fn best_effort<T, F>(&self, collaborator: &'static str, request_id: Uuid, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        match timeout(self.settings.collaborator_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                let err = AppError::Dependency(format!("{collaborator}: {err}"));
                warn!(request_id = %request_id, error = %err, "collaborator call failed");
                None
            }
            Err(_) => {
                warn!(request_id = %request_id, collaborator, "collaborator call timed out");
                None
            }
        }
    }
}

fn validate_vehicle(vehicle: &VehicleInfo) -> Result<(), AppError> {
    for (field, value) in [
        ("vehicleType", &vehicle.vehicle_type),
        ("model", &vehicle.model),
        ("plateNumber", &vehicle.plate_number),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("vehicleInfo.{field} is required")));
        }
    }
    Ok(())
}

fn validate_amount(field: &str, amount: f64) -> Result<(), AppError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(AppError::Validation(format!(
            "{field} must be a non-negative number"
        )));
    }
    Ok(())
}

fn clean(text: Option<String>) -> Option<String> {
    text.map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::{LifecycleOrchestrator, LifecycleSettings};
    use crate::engine::collaborators::{
        LoggingNotifier, LoggingPaymentGateway, Notification, NotificationKind, Notifier,
        PaymentGateway, PricingService, TariffPricing,
    };
    use crate::engine::directory::{MechanicDirectory, MechanicProfile};
    use crate::engine::dispatch::{DispatchBroadcaster, DispatchSettings};
    use crate::engine::state_machine::{Completion, StateMachine};
    use crate::error::AppError;
    use crate::geo::selector::RadiusBounds;
    use crate::models::actor::{Actor, Role};
    use crate::models::location::{GeoPoint, RequestLocation};
    use crate::models::request::{
        IssueType, NewRequest, RequestStatus, ServiceRequest, VehicleInfo,
    };
    use crate::observability::metrics::Metrics;
    use crate::realtime::events::{REQUEST_ACCEPTED, REQUEST_UPDATED};
    use crate::realtime::registry::SessionRegistry;

    const BOUNDS: RadiusBounds = RadiusBounds {
        min_km: 1.0,
        max_km: 50.0,
    };

    struct SlowPricing;

    #[async_trait]
    impl PricingService for SlowPricing {
        async fn quote(&self, _request: &ServiceRequest, _mechanic_id: Uuid) -> Result<f64, AppError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(1.0)
        }
    }

    struct BrokenPricing;

    #[async_trait]
    impl PricingService for BrokenPricing {
        async fn quote(&self, _request: &ServiceRequest, _mechanic_id: Uuid) -> Result<f64, AppError> {
            Err(AppError::Dependency("pricing offline".to_string()))
        }
    }

    struct BrokenPayments;

    #[async_trait]
    impl PaymentGateway for BrokenPayments {
        async fn request_completed(&self, _request: &ServiceRequest) -> Result<(), AppError> {
            Err(AppError::Dependency("gateway down".to_string()))
        }

        async fn payment_succeeded(&self, _request: &ServiceRequest) -> Result<(), AppError> {
            Err(AppError::Dependency("gateway down".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, notification: Notification) -> Result<(), AppError> {
            self.sent.lock().unwrap().push(notification);
            Ok(())
        }
    }

    struct World {
        directory: Arc<MechanicDirectory>,
        machine: Arc<StateMachine>,
        registry: Arc<SessionRegistry>,
        lifecycle: Arc<LifecycleOrchestrator>,
        customer: Actor,
    }

    fn world_with(
        pricing: Arc<dyn PricingService>,
        payments: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> World {
        let metrics = Metrics::new();
        let directory = Arc::new(MechanicDirectory::new());
        let machine = Arc::new(StateMachine::new(directory.clone()));
        let registry = Arc::new(SessionRegistry::new(32, metrics.clone()));
        let broadcaster = Arc::new(DispatchBroadcaster::new(
            machine.clone(),
            directory.clone(),
            registry.clone(),
            DispatchSettings {
                radius_bounds: BOUNDS,
                area_cell_degrees: 0.1,
                eta_speed_kmh: 30.0,
            },
            metrics.clone(),
        ));
        let lifecycle = Arc::new(LifecycleOrchestrator::new(
            machine.clone(),
            broadcaster,
            pricing,
            payments,
            notifier,
            LifecycleSettings {
                radius_bounds: BOUNDS,
                default_radius_km: 15.0,
                collaborator_timeout: Duration::from_millis(50),
                default_quotation: 500.0,
            },
            metrics,
        ));
        World {
            directory,
            machine,
            registry,
            lifecycle,
            customer: Actor::customer(Uuid::new_v4()),
        }
    }

    fn world() -> World {
        world_with(
            Arc::new(TariffPricing),
            Arc::new(LoggingPaymentGateway),
            Arc::new(LoggingNotifier),
        )
    }

    fn new_request() -> NewRequest {
        NewRequest {
            issue_type: Some(IssueType::FlatTire),
            description: "front tyre burst".to_string(),
            vehicle_info: Some(VehicleInfo {
                vehicle_type: "car".to_string(),
                model: "i20".to_string(),
                plate_number: "KA03XY9876".to_string(),
                year: Some(2021),
            }),
            location: Some(RequestLocation {
                lat: 12.97,
                lng: 77.59,
                address: None,
            }),
            priority: None,
            radius_km: Some(10.0),
            images: vec![],
        }
    }

    impl World {
        fn mechanic(&self) -> Actor {
            let mechanic = self
                .directory
                .register(MechanicProfile {
                    name: "Mechanic".to_string(),
                    location: Some(GeoPoint::new(12.98, 77.59)),
                    rating: 4.2,
                    specialties: vec![],
                })
                .unwrap();
            self.directory
                .set_verification(&mechanic.id, Some(true), Some(true))
                .unwrap();
            Actor::mechanic(mechanic.id)
        }

        async fn open(&self) -> ServiceRequest {
            self.lifecycle
                .create_request(&self.customer, new_request())
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn create_rejects_missing_fields() {
        let w = world();
        let mut missing_vehicle = new_request();
        missing_vehicle.vehicle_info = None;
        let mut far_radius = new_request();
        far_radius.radius_km = Some(500.0);

        for details in [missing_vehicle, far_radius] {
            let err = w
                .lifecycle
                .create_request(&w.customer, details)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert!(w.machine.is_empty());
    }

    #[tokio::test]
    async fn mechanics_cannot_raise_requests() {
        let w = world();
        let mechanic = w.mechanic();
        let err = w
            .lifecycle
            .create_request(&mechanic, new_request())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_accepts_produce_one_assignment() {
        let w = world();
        let request = w.open().await;
        let request_id = request.id;
        let mechanics: Vec<Actor> = (0..8).map(|_| w.mechanic()).collect();

        let tasks: Vec<_> = mechanics
            .iter()
            .copied()
            .map(|mechanic| {
                let lifecycle = w.lifecycle.clone();
                tokio::spawn(async move {
                    lifecycle
                        .accept_request(&mechanic, request_id, Some(15), Some(300.0))
                        .await
                })
            })
            .collect();

        let mut won = 0;
        let mut lost = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => won += 1,
                Err(AppError::AlreadyClaimed { .. }) => lost += 1,
                Err(other) => panic!("unexpected rejection: {other}"),
            }
        }
        assert_eq!((won, lost), (1, 7));

        let stored = w.machine.get(&request.id).unwrap();
        assert_eq!(stored.history.len(), request.history.len() + 1);
        assert_eq!(stored.quotation, Some(300.0));
    }

    #[tokio::test]
    async fn slow_pricing_falls_back_to_default_quotation() {
        let w = world_with(
            Arc::new(SlowPricing),
            Arc::new(LoggingPaymentGateway),
            Arc::new(LoggingNotifier),
        );
        let request = w.open().await;
        let mechanic = w.mechanic();

        let accepted = w
            .lifecycle
            .accept_request(&mechanic, request.id, Some(10), None)
            .await
            .unwrap();

        assert_eq!(accepted.status, RequestStatus::Assigned);
        assert_eq!(accepted.quotation, Some(500.0));
    }

    #[tokio::test]
    async fn failing_pricing_falls_back_to_default_quotation() {
        let w = world_with(
            Arc::new(BrokenPricing),
            Arc::new(LoggingPaymentGateway),
            Arc::new(LoggingNotifier),
        );
        let request = w.open().await;
        let mechanic = w.mechanic();

        let accepted = w
            .lifecycle
            .accept_request(&mechanic, request.id, None, None)
            .await
            .unwrap();
        assert_eq!(accepted.quotation, Some(500.0));
    }

    #[tokio::test]
    async fn tariff_pricing_quotes_when_mechanic_sends_none() {
        let w = world();
        let (_, mut customer_rx) = w.registry.connect(w.customer.id, Role::Customer);
        let request = w.open().await;
        let mechanic = w.mechanic();
        while customer_rx.try_recv().is_ok() {}

        let accepted = w
            .lifecycle
            .accept_request(&mechanic, request.id, None, None)
            .await
            .unwrap();
        assert_eq!(accepted.quotation, Some(400.0));

        let accepted_frame = customer_rx.try_recv().unwrap();
        assert_eq!(accepted_frame.event, REQUEST_ACCEPTED);
        assert!(accepted_frame.data["quotation"].is_null());
        let quoted_frame = customer_rx.try_recv().unwrap();
        assert_eq!(quoted_frame.event, REQUEST_UPDATED);
        assert_eq!(quoted_frame.data["quotation"], 400.0);
        assert!(customer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn payment_failure_does_not_undo_completion() {
        let notifier = Arc::new(RecordingNotifier::default());
        let w = world_with(
            Arc::new(TariffPricing),
            Arc::new(BrokenPayments),
            notifier.clone(),
        );
        let request = w.open().await;
        let mechanic = w.mechanic();
        w.lifecycle
            .accept_request(&mechanic, request.id, Some(10), None)
            .await
            .unwrap();
        for target in [RequestStatus::Enroute, RequestStatus::InProgress] {
            w.lifecycle
                .update_status(&mechanic, request.id, target, None)
                .await
                .unwrap();
        }

        let done = w
            .lifecycle
            .complete_request(
                &mechanic,
                request.id,
                Completion {
                    work_summary: Some("replaced tube".to_string()),
                    final_amount: Some(650.0),
                    parts_used: vec![],
                },
            )
            .await
            .unwrap();

        assert_eq!(done.status, RequestStatus::Completed);
        assert!(done.work_duration_minutes.is_some());
        assert!(w.directory.get(&mechanic.id).unwrap().is_available());
        let kinds: Vec<_> = notifier.sent.lock().unwrap().iter().map(|n| n.kind).collect();
        assert_eq!(kinds.last(), Some(&NotificationKind::RequestCompleted));
    }

    #[tokio::test]
    async fn customer_cancel_frees_mechanic_and_closes_request() {
        let w = world();
        let request = w.open().await;
        let mechanic = w.mechanic();
        w.lifecycle
            .accept_request(&mechanic, request.id, Some(10), None)
            .await
            .unwrap();

        let cancelled = w
            .lifecycle
            .cancel_request(&w.customer, request.id, "towed instead".to_string())
            .await
            .unwrap();

        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(w.directory.get(&mechanic.id).unwrap().is_available());

        let err = w
            .lifecycle
            .update_status(&mechanic, request.id, RequestStatus::Enroute, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        let err = w
            .lifecycle
            .cancel_request(&w.customer, request.id, "again".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn only_the_assigned_mechanic_moves_the_request() {
        let w = world();
        let request = w.open().await;
        let assigned = w.mechanic();
        let other = w.mechanic();
        w.lifecycle
            .accept_request(&assigned, request.id, None, None)
            .await
            .unwrap();

        let err = w
            .lifecycle
            .update_status(&other, request.id, RequestStatus::Enroute, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = w
            .lifecycle
            .update_status(&assigned, request.id, RequestStatus::InProgress, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: RequestStatus::Assigned,
                to: RequestStatus::InProgress
            }
        ));
    }

    #[tokio::test]
    async fn redispatch_is_limited_to_pending_requests_of_the_owner() {
        let w = world();
        let request = w.open().await;
        let stranger = Actor::customer(Uuid::new_v4());

        assert!(w.lifecycle.redispatch(&w.customer, request.id).is_ok());
        assert!(matches!(
            w.lifecycle.redispatch(&stranger, request.id),
            Err(AppError::Forbidden(_))
        ));

        let mechanic = w.mechanic();
        w.lifecycle
            .accept_request(&mechanic, request.id, None, None)
            .await
            .unwrap();
        assert!(matches!(
            w.lifecycle.redispatch(&w.customer, request.id),
            Err(AppError::NoLongerPending { .. })
        ));
    }
}
