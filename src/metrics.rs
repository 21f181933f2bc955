//! Prometheus metrics for the exporter.
//!
//! All metrics live in an explicit [`prometheus::Registry`] owned by
//! [`ExporterMetrics`], not the process-global default registry. The
//! handle is passed to every component that needs it, so tests run
//! against isolated registries.

use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder,
};

/// The per-population series: two labeled gauges per token plus an
/// unlabeled total for the last completed cycle.
pub struct PopulationMetrics {
    expires_at: GaugeVec,
    is_expired: GaugeVec,
    total: Gauge,
}

impl PopulationMetrics {
    fn register(registry: &Registry, population: &str) -> prometheus::Result<Self> {
        let expires_at = GaugeVec::new(
            Opts::new(
                format!("{population}_token_expires_at"),
                format!("Hours until the {population} token expires (negative if past)"),
            ),
            &["name"],
        )?;
        registry.register(Box::new(expires_at.clone()))?;

        let is_expired = GaugeVec::new(
            Opts::new(
                format!("{population}_token_is_expired"),
                format!("Whether the {population} token is expired (1) or not (0)"),
            ),
            &["name"],
        )?;
        registry.register(Box::new(is_expired.clone()))?;

        let total = Gauge::with_opts(Opts::new(
            format!("{population}_tokens_total"),
            format!("Number of {population} tokens found in the last scrape"),
        ))?;
        registry.register(Box::new(total.clone()))?;

        Ok(Self {
            expires_at,
            is_expired,
            total,
        })
    }

    /// Publish both series for one token identity.
    pub fn publish(&self, identity: &str, hours_until_expiry: f64, expired: bool) {
        self.expires_at
            .with_label_values(&[identity])
            .set(hours_until_expiry);
        self.is_expired
            .with_label_values(&[identity])
            .set(if expired { 1.0 } else { 0.0 });
    }

    /// Remove both series for an identity that is no longer observed.
    /// Removing an identity that was never published is a no-op.
    pub fn retract(&self, identity: &str) {
        let _ = self.expires_at.remove_label_values(&[identity]);
        let _ = self.is_expired.remove_label_values(&[identity]);
    }

    pub fn set_total(&self, total: usize) {
        self.total.set(total as f64);
    }
}

/// Metric handle shared by the scraper (writer) and the HTTP pull
/// surface (reader). The registry is internally synchronized, so the
/// `/metrics` endpoint can export while a scrape cycle is publishing.
pub struct ExporterMetrics {
    registry: Registry,
    pub project: PopulationMetrics,
    pub user: PopulationMetrics,
    pub group: PopulationMetrics,
    scrape_duration: Histogram,
    scrape_errors: IntCounter,
    last_scrape_time: Gauge,
}

impl ExporterMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let project = PopulationMetrics::register(&registry, "project")?;
        let user = PopulationMetrics::register(&registry, "user")?;
        let group = PopulationMetrics::register(&registry, "group")?;

        let scrape_duration = Histogram::with_opts(HistogramOpts::new(
            "scrape_duration_seconds",
            "Duration of one token scrape cycle",
        ))?;
        registry.register(Box::new(scrape_duration.clone()))?;

        let scrape_errors = IntCounter::with_opts(Opts::new(
            "scrape_errors_total",
            "Total number of scraping errors",
        ))?;
        registry.register(Box::new(scrape_errors.clone()))?;

        let last_scrape_time = Gauge::with_opts(Opts::new(
            "last_scrape_timestamp",
            "Unix timestamp of the last scrape cycle",
        ))?;
        registry.register(Box::new(last_scrape_time.clone()))?;

        Ok(Self {
            registry,
            project,
            user,
            group,
            scrape_duration,
            scrape_errors,
            last_scrape_time,
        })
    }

    pub fn observe_scrape_duration(&self, duration: std::time::Duration) {
        self.scrape_duration.observe(duration.as_secs_f64());
    }

    pub fn inc_scrape_errors(&self) {
        self.scrape_errors.inc();
    }

    pub fn scrape_errors(&self) -> u64 {
        self.scrape_errors.get()
    }

    pub fn set_last_scrape_time(&self, timestamp: DateTime<Utc>) {
        self.last_scrape_time.set(timestamp.timestamp() as f64);
    }

    /// Encode the registry contents in Prometheus text exposition
    /// format. Served by the `/metrics` HTTP handler.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .unwrap_or_default();
        String::from_utf8(buffer).unwrap_or_default()
    }
}

// ── Tests ─────────────────────────────────────────────────────
