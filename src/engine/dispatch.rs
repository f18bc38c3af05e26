use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::directory::MechanicDirectory;
use crate::engine::state_machine::StateMachine;
use crate::error::AppError;
use crate::geo::selector::{find_candidates, CandidateFilters, MechanicRef, RadiusBounds};
use crate::geo::{area_cell, eta_minutes, haversine_km};
use crate::models::actor::Actor;
use crate::models::location::GeoPoint;
use crate::models::mechanic::Mechanic;
use crate::models::request::{RequestStatus, ServiceRequest};
use crate::observability::metrics::Metrics;
use crate::realtime::events::{
    LocationUpdated, RequestTaken, RequestUpdated, LOCATION_UPDATED, NEW_REQUEST_AVAILABLE,
    REQUEST_ACCEPTED, REQUEST_TAKEN, REQUEST_UPDATED,
};
use crate::realtime::registry::{Room, SessionRegistry};

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub radius_bounds: RadiusBounds,
    pub area_cell_degrees: f64,
    pub eta_speed_kmh: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub request_id: Uuid,
    pub area: String,
    pub radius_km: f64,
    pub candidates: Vec<MechanicRef>,
    pub excluded: usize,
    pub delivered: usize,
}

pub struct DispatchBroadcaster {
    machine: Arc<StateMachine>,
    directory: Arc<MechanicDirectory>,
    registry: Arc<SessionRegistry>,
    settings: DispatchSettings,
    // Candidates told about each still-open request, so they can be told
    // when it is gone.
    audiences: DashMap<Uuid, BTreeSet<Uuid>>,
    metrics: Metrics,
}

impl DispatchBroadcaster {
    pub fn new(
        machine: Arc<StateMachine>,
        directory: Arc<MechanicDirectory>,
        registry: Arc<SessionRegistry>,
        settings: DispatchSettings,
        metrics: Metrics,
    ) -> Self {
        Self {
            machine,
            directory,
            registry,
            settings,
            audiences: DashMap::new(),
            metrics,
        }
    }

    pub fn area_for(&self, point: &GeoPoint) -> String {
        area_cell(point, self.settings.area_cell_degrees)
    }

    /// Broadcasts the stored request. Callers pass the id so a claim that
    /// committed since they last read the record is never re-announced.
    pub fn dispatch(&self, request_id: Uuid) -> Result<DispatchReport, AppError> {
        let request = self
            .machine
            .get(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;
        if request.status != RequestStatus::Pending {
            return Err(AppError::NoLongerPending {
                request_id: request.id,
                status: request.status,
            });
        }

        let origin = request.location.point();
        let snapshot = self.directory.snapshot();
        let filters = CandidateFilters {
            require_available: true,
            ..CandidateFilters::default()
        };
        let selection = find_candidates(
            snapshot.iter(),
            origin,
            request.radius_km,
            self.settings.radius_bounds,
            &filters,
        )?;

        self.audiences
            .entry(request.id)
            .or_default()
            .extend(selection.candidates.iter().map(|c| c.mechanic_id));

        let mut delivered = 0;
        for candidate in &selection.candidates {
            delivered += self.registry.publish(
                &Room::User(candidate.mechanic_id),
                NEW_REQUEST_AVAILABLE,
                &request.summary(Some(candidate.distance_km)),
            );
        }

        let area = self.area_for(&origin);
        delivered += self.registry.publish(
            &Room::Area(area.clone()),
            NEW_REQUEST_AVAILABLE,
            &request.summary(None),
        );

        // A claim may have committed while the frames went out.
        if let Some(current) = self.machine.get(&request.id) {
            if current.status != RequestStatus::Pending {
                self.withdraw(&current, current.assigned_mechanic_id);
            }
        }
        self.metrics
            .dispatch_candidates
            .observe(selection.candidates.len() as f64);

        info!(
            request_id = %request.id,
            area = %area,
            candidates = selection.candidates.len(),
            excluded = selection.excluded.len(),
            delivered,
            "request dispatched"
        );

        Ok(DispatchReport {
            request_id: request.id,
            area,
            radius_km: selection.radius_km,
            candidates: selection.candidates,
            excluded: selection.excluded.len(),
            delivered,
        })
    }

    /// Runs the atomic claim. Only a successful claim is broadcast; a
    /// rejection goes back to the caller alone.
    pub fn resolve_claim(
        &self,
        request_id: Uuid,
        mechanic: &Actor,
        estimated_arrival_minutes: Option<u32>,
        quotation: Option<f64>,
    ) -> Result<ServiceRequest, AppError> {
        let claimed = match self
            .machine
            .claim(request_id, mechanic, estimated_arrival_minutes, quotation)
        {
            Ok(claimed) => claimed,
            Err(err) => {
                self.metrics
                    .claims_total
                    .with_label_values(&[err.code()])
                    .inc();
                debug!(request_id = %request_id, mechanic_id = %mechanic.id, error = %err, "claim rejected");
                return Err(err);
            }
        };
        self.metrics.claims_total.with_label_values(&["won"]).inc();
        self.metrics
            .transitions_total
            .with_label_values(&[RequestStatus::Assigned.as_str()])
            .inc();

        let request = claimed.request;
        self.withdraw(&request, Some(mechanic.id));

        let accepted = RequestUpdated::from_request(&request, Some(claimed.from));
        self.registry
            .publish(&Room::User(request.customer_id), REQUEST_ACCEPTED, &accepted);
        self.registry
            .publish(&Room::Request(request.id), REQUEST_ACCEPTED, &accepted);
        self.registry.publish(&Room::Admins, REQUEST_UPDATED, &accepted);

        info!(request_id = %request.id, mechanic_id = %mechanic.id, "request claimed");
        Ok(request)
    }

    /// Fans a committed status change out to everyone following the request.
    pub fn announce_update(&self, request: &ServiceRequest, previous: Option<RequestStatus>) {
        if let Some(previous) = previous {
            self.metrics
                .transitions_total
                .with_label_values(&[request.status.as_str()])
                .inc();
            if previous == RequestStatus::Pending && request.status != RequestStatus::Pending {
                self.withdraw(request, request.assigned_mechanic_id);
            }
        }

        let update = RequestUpdated::from_request(request, previous);
        self.registry
            .publish(&Room::Request(request.id), REQUEST_UPDATED, &update);
        self.registry
            .publish(&Room::User(request.customer_id), REQUEST_UPDATED, &update);
        if let Some(mechanic_id) = request.assigned_mechanic_id {
            self.registry
                .publish(&Room::User(mechanic_id), REQUEST_UPDATED, &update);
        }
        self.registry.publish(&Room::Admins, REQUEST_UPDATED, &update);
    }

    /// Stores a mechanic's new position and relays it to their open request.
    pub fn relay_location(
        &self,
        mechanic_id: &Uuid,
        location: GeoPoint,
        accuracy: Option<f64>,
    ) -> Result<Mechanic, AppError> {
        let mechanic = self.directory.update_location(mechanic_id, location)?;
        self.publish_location(&mechanic, accuracy);
        Ok(mechanic)
    }

    /// Relays a mechanic's new position to the request they are working, with
    /// an ETA to the request location.
    pub fn publish_location(&self, mechanic: &Mechanic, accuracy: Option<f64>) -> usize {
        let (Some(request_id), Some(location)) = (mechanic.active_request_id, mechanic.location)
        else {
            return 0;
        };
        let Some(request) = self.machine.get(&request_id) else {
            return 0;
        };

        let eta = if request.status.holds_assignment() && request.status != RequestStatus::InProgress
        {
            eta_minutes(
                haversine_km(&location, &request.location.point()),
                self.settings.eta_speed_kmh,
            )
        } else {
            None
        };

        let payload = LocationUpdated {
            mechanic_id: mechanic.id,
            lat: location.lat,
            lng: location.lng,
            accuracy,
            eta,
        };
        self.registry
            .publish(&Room::Request(request_id), LOCATION_UPDATED, &payload)
    }

    /// Tells the candidates and the area feed that a request is no longer up
    /// for grabs. `except` is skipped (the winner).
    fn withdraw(&self, request: &ServiceRequest, except: Option<Uuid>) {
        let taken = RequestTaken {
            request_id: request.id,
        };
        let audience = self
            .audiences
            .remove(&request.id)
            .map(|(_, audience)| audience)
            .unwrap_or_default();

        for mechanic_id in audience.into_iter().filter(|id| Some(*id) != except) {
            self.registry
                .publish(&Room::User(mechanic_id), REQUEST_TAKEN, &taken);
        }
        let area = self.area_for(&request.location.point());
        self.registry
            .publish(&Room::Area(area), REQUEST_TAKEN, &taken);
    }
}
