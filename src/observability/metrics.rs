use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub requests_created_total: IntCounter,
    pub claims_total: IntCounterVec,
    pub transitions_total: IntCounterVec,
    pub broadcast_deliveries_total: IntCounterVec,
    pub connected_sessions: IntGauge,
    pub dispatch_candidates: Histogram,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_created_total =
            IntCounter::new("requests_created_total", "Service requests created")
                .expect("valid requests_created_total metric");

        let claims_total = IntCounterVec::new(
            Opts::new("claims_total", "Claim attempts by outcome"),
            &["outcome"],
        )
        .expect("valid claims_total metric");

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Committed status transitions by target status"),
            &["status"],
        )
        .expect("valid transitions_total metric");

        let broadcast_deliveries_total = IntCounterVec::new(
            Opts::new(
                "broadcast_deliveries_total",
                "Frames queued to live sessions by event name",
            ),
            &["event"],
        )
        .expect("valid broadcast_deliveries_total metric");

        let connected_sessions =
            IntGauge::new("connected_sessions", "Currently connected live sessions")
                .expect("valid connected_sessions metric");

        let dispatch_candidates = Histogram::with_opts(
            HistogramOpts::new(
                "dispatch_candidates",
                "Number of candidate mechanics per dispatch",
            )
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0]),
        )
        .expect("valid dispatch_candidates metric");

        registry
            .register(Box::new(requests_created_total.clone()))
            .expect("register requests_created_total");
        registry
            .register(Box::new(claims_total.clone()))
            .expect("register claims_total");
        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(broadcast_deliveries_total.clone()))
            .expect("register broadcast_deliveries_total");
        registry
            .register(Box::new(connected_sessions.clone()))
            .expect("register connected_sessions");
        registry
            .register(Box::new(dispatch_candidates.clone()))
            .expect("register dispatch_candidates");

        Self {
            registry,
            requests_created_total,
            claims_total,
            transitions_total,
            broadcast_deliveries_total,
            connected_sessions,
            dispatch_candidates,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
