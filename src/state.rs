use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::engine::collaborators::{
    LoggingNotifier, LoggingPaymentGateway, Notifier, PaymentGateway, PricingService,
    TariffPricing,
};
use crate::engine::directory::MechanicDirectory;
use crate::engine::dispatch::{DispatchBroadcaster, DispatchSettings};
use crate::engine::lifecycle::{LifecycleOrchestrator, LifecycleSettings};
use crate::engine::state_machine::StateMachine;
use crate::observability::metrics::Metrics;
use crate::realtime::registry::SessionRegistry;

pub struct AppState {
    pub config: Config,
    pub directory: Arc<MechanicDirectory>,
    pub machine: Arc<StateMachine>,
    pub registry: Arc<SessionRegistry>,
    pub broadcaster: Arc<DispatchBroadcaster>,
    pub lifecycle: Arc<LifecycleOrchestrator>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_collaborators(
            config,
            Arc::new(TariffPricing),
            Arc::new(LoggingPaymentGateway),
            Arc::new(LoggingNotifier),
        )
    }

    pub fn with_collaborators(
        config: Config,
        pricing: Arc<dyn PricingService>,
        payments: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let metrics = Metrics::new();
        let radius_bounds = config.radius_bounds();

        let directory = Arc::new(MechanicDirectory::new());
        let machine = Arc::new(StateMachine::new(directory.clone()));
        let registry = Arc::new(SessionRegistry::new(
            config.session_buffer_size,
            metrics.clone(),
        ));
        let broadcaster = Arc::new(DispatchBroadcaster::new(
            machine.clone(),
            directory.clone(),
            registry.clone(),
            DispatchSettings {
                radius_bounds,
                area_cell_degrees: config.area_cell_degrees,
                eta_speed_kmh: config.eta_speed_kmh,
            },
            metrics.clone(),
        ));
        let lifecycle = Arc::new(LifecycleOrchestrator::new(
            machine.clone(),
            broadcaster.clone(),
            pricing,
            payments,
            notifier,
            LifecycleSettings {
                radius_bounds,
                default_radius_km: config.default_radius_km,
                collaborator_timeout: Duration::from_millis(config.pricing_timeout_ms),
                default_quotation: config.default_quotation,
            },
            metrics.clone(),
        ));

        Self {
            config,
            directory,
            machine,
            registry,
            broadcaster,
            lifecycle,
            metrics,
        }
    }
}
