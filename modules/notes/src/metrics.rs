use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,

    // Counters
    pub http_requests_total: IntCounterVec,
    pub user_events_consumed_total: IntCounterVec,

    // Histograms
    pub http_request_duration_seconds: HistogramVec,
    pub event_processing_duration_seconds: HistogramVec,

    // Dependency gauges
    pub dep_up: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("notes_http_requests_total", "Total HTTP requests"),
            &["method", "path", "status"],
        )?;

        let user_events_consumed_total = IntCounterVec::new(
            Opts::new("notes_user_events_consumed_total", "User lifecycle events consumed"),
            &["event_type", "outcome"], // outcome: applied|duplicate|ignored|failed
        )?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("notes_http_request_duration_seconds", "HTTP request duration seconds"),
            &["path", "method", "status"],
        )?;

        let event_processing_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "notes_event_processing_duration_seconds",
                "Time spent applying one user event",
            ),
            &["event_type"],
        )?;

        let dep_up = IntGaugeVec::new(
            Opts::new("notes_dependency_up", "Dependency up gauge"),
            &["dep"], // store|broker|ready
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(user_events_consumed_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(event_processing_duration_seconds.clone()))?;
        registry.register(Box::new(dep_up.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            user_events_consumed_total,
            http_request_duration_seconds,
            event_processing_duration_seconds,
            dep_up,
        })
    }

    pub fn render(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        let mut buf = Vec::new();
        encoder
            .encode(&mf, &mut buf)
            .map_err(|e| e.to_string())?;
        String::from_utf8(buf).map_err(|e| e.to_string())
    }
}
