use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub offers_total: IntCounterVec,
    pub dispatch_cycles_total: IntCounterVec,
    pub dispatch_latency_seconds: HistogramVec,
    pub dispatch_queue_depth: IntGauge,
    pub tasks_in_backoff: IntGauge,
    pub dispatch_exhausted_total: IntCounter,
    pub notification_failures_total: IntCounter,
    pub overdue_tasks: IntGauge,
    pub workers_busy: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Task offers by outcome"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let dispatch_cycles_total = IntCounterVec::new(
            Opts::new("dispatch_cycles_total", "Dispatch cascade cycles by outcome"),
            &["outcome"],
        )
        .expect("valid dispatch_cycles_total metric");

        let dispatch_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "dispatch_latency_seconds",
                "Time from dispatch start to cycle outcome in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
            &["outcome"],
        )
        .expect("valid dispatch_latency_seconds metric");

        let dispatch_queue_depth =
            IntGauge::new("dispatch_queue_depth", "Dispatch requests waiting in the queue")
                .expect("valid dispatch_queue_depth metric");

        let tasks_in_backoff = IntGauge::new(
            "tasks_in_backoff",
            "Pending tasks waiting out a retry delay after an exhausted cascade",
        )
        .expect("valid tasks_in_backoff metric");

        let dispatch_exhausted_total = IntCounter::new(
            "dispatch_exhausted_total",
            "Tasks that ran out of dispatch attempts",
        )
        .expect("valid dispatch_exhausted_total metric");

        let notification_failures_total = IntCounter::new(
            "notification_failures_total",
            "Offer notifications that failed to deliver",
        )
        .expect("valid notification_failures_total metric");

        let overdue_tasks = IntGauge::new("overdue_tasks", "Open tasks past their deadline")
            .expect("valid overdue_tasks metric");

        let workers_busy = IntGauge::new("workers_busy", "Workers holding an active allocation")
            .expect("valid workers_busy metric");

        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(dispatch_cycles_total.clone()))
            .expect("register dispatch_cycles_total");
        registry
            .register(Box::new(dispatch_latency_seconds.clone()))
            .expect("register dispatch_latency_seconds");
        registry
            .register(Box::new(dispatch_queue_depth.clone()))
            .expect("register dispatch_queue_depth");
        registry
            .register(Box::new(tasks_in_backoff.clone()))
            .expect("register tasks_in_backoff");
        registry
            .register(Box::new(dispatch_exhausted_total.clone()))
            .expect("register dispatch_exhausted_total");
        registry
            .register(Box::new(notification_failures_total.clone()))
            .expect("register notification_failures_total");
        registry
            .register(Box::new(overdue_tasks.clone()))
            .expect("register overdue_tasks");
        registry
            .register(Box::new(workers_busy.clone()))
            .expect("register workers_busy");

        Self {
            registry,
            offers_total,
            dispatch_cycles_total,
            dispatch_latency_seconds,
            dispatch_queue_depth,
            tasks_in_backoff,
            dispatch_exhausted_total,
            notification_failures_total,
            overdue_tasks,
            workers_busy,
        }
    }

    pub fn record_offer(&self, outcome: &str) {
        self.offers_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_cycle(&self, outcome: &str, elapsed_secs: f64) {
        self.dispatch_cycles_total
            .with_label_values(&[outcome])
            .inc();
        self.dispatch_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_secs);
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
