use prometheus::{
    CounterVec, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder,
    histogram_opts, opts,
};

/// Prometheus registry and collectors for the BucketDNS server
pub struct ServerMetrics {
    registry: Registry,

    // Query metrics
    queries_total: IntCounterVec,
    query_duration: HistogramVec,
    truncated_responses: CounterVec,

    // Zone metrics
    zones: IntGauge,
    zone_updates: IntCounter,
    reload_cycles: IntCounterVec,

    // Flattening
    flatten_total: IntCounterVec,

    started: IntCounter,
}

impl ServerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries_total = IntCounterVec::new(
            opts!(
                "bucketdns_queries_total",
                "DNS queries by outcome (request, error, answer)"
            ),
            &["outcome"],
        )?;

        let query_duration = HistogramVec::new(
            histogram_opts!(
                "bucketdns_query_duration_seconds",
                "DNS query processing duration in seconds"
            ),
            &["protocol"],
        )?;

        let truncated_responses = CounterVec::new(
            opts!(
                "bucketdns_truncated_responses_total",
                "Responses truncated to fit a UDP datagram"
            ),
            &["protocol"],
        )?;

        let zones = IntGauge::with_opts(opts!(
            "bucketdns_zones",
            "Number of zones currently served"
        ))?;

        let zone_updates = IntCounter::with_opts(opts!(
            "bucketdns_zone_updates_total",
            "Zones installed by reload cycles"
        ))?;

        let reload_cycles = IntCounterVec::new(
            opts!(
                "bucketdns_reload_cycles_total",
                "Reload cycles by result (ok, error)"
            ),
            &["result"],
        )?;

        let flatten_total = IntCounterVec::new(
            opts!(
                "bucketdns_flatten_total",
                "Apex CNAME flattening attempts by result (ok, error)"
            ),
            &["result"],
        )?;

        let started = IntCounter::with_opts(opts!(
            "bucketdns_started_total",
            "Server starts"
        ))?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(query_duration.clone()))?;
        registry.register(Box::new(truncated_responses.clone()))?;
        registry.register(Box::new(zones.clone()))?;
        registry.register(Box::new(zone_updates.clone()))?;
        registry.register(Box::new(reload_cycles.clone()))?;
        registry.register(Box::new(flatten_total.clone()))?;
        registry.register(Box::new(started.clone()))?;

        Ok(Self {
            registry,
            queries_total,
            query_duration,
            truncated_responses,
            zones,
            zone_updates,
            reload_cycles,
            flatten_total,
            started,
        })
    }

    /// An incoming query was received
    pub fn record_request(&self) {
        self.queries_total.with_label_values(&["request"]).inc();
    }

    /// A query was dropped (malformed, wrong class, several questions)
    pub fn record_error(&self) {
        self.queries_total.with_label_values(&["error"]).inc();
    }

    /// A reply was built from a loaded zone, including NXDOMAIN and NODATA
    pub fn record_answer(&self) {
        self.queries_total.with_label_values(&["answer"]).inc();
    }

    pub fn observe_query_duration(&self, protocol: &str, duration: std::time::Duration) {
        self.query_duration
            .with_label_values(&[protocol])
            .observe(duration.as_secs_f64());
    }

    pub fn record_truncated_response(&self, protocol: &str) {
        self.truncated_responses.with_label_values(&[protocol]).inc();
    }

    pub fn record_flatten(&self, ok: bool) {
        self.flatten_total
            .with_label_values(&[if ok { "ok" } else { "error" }])
            .inc();
    }

    /// A reload cycle finished successfully, installing `updated` zones
    pub fn record_reload_success(&self, updated: usize, zone_count: usize) {
        self.reload_cycles.with_label_values(&["ok"]).inc();
        self.zone_updates.inc_by(updated as u64);
        self.zones.set(zone_count as i64);
    }

    pub fn record_reload_failure(&self) {
        self.reload_cycles.with_label_values(&["error"]).inc();
    }

    pub fn record_started(&self) {
        self.started.inc();
    }

    /// Current value of a `bucketdns_queries_total` series
    pub fn query_count(&self, outcome: &str) -> u64 {
        self.queries_total.with_label_values(&[outcome]).get()
    }

    pub fn zone_updates(&self) -> u64 {
        self.zone_updates.get()
    }

    /// Export metrics in Prometheus format
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}
