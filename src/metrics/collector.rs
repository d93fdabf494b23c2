//! Metrics collection using Prometheus
//!
//! Queue, matching, session and friend-cache metrics for the meeting matcher.

use crate::types::Gender;
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the meeting matcher
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    service_metrics: ServiceMetrics,
    queue_metrics: QueueMetrics,
    match_metrics: MatchMetrics,
    session_metrics: SessionMetrics,
    friend_metrics: FriendMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Participant queue metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Participants currently waiting, by gender
    pub participants_waiting: IntGaugeVec,

    /// Total join requests, by gender
    pub joins_total: IntCounterVec,

    /// Total explicit leaves, by gender
    pub leaves_total: IntCounterVec,

    /// Participants put back at the tail after a failed session setup
    pub restored_total: IntCounter,

    /// Time matched participants spent waiting
    pub wait_time_seconds: HistogramVec,
}

/// Matching attempt metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Attempts by outcome (matched, no_match, stale, failed)
    pub attempts_total: IntCounterVec,

    /// Friend hydration plus group search time
    pub attempt_duration: Histogram,

    /// Time from join request to response
    pub join_processing_duration: Histogram,
}

/// Video session metrics
#[derive(Clone)]
pub struct SessionMetrics {
    /// Sessions currently tracked
    pub active_sessions: IntGauge,

    /// Total sessions created
    pub sessions_created_total: IntCounter,

    /// Total sessions closed
    pub sessions_closed_total: IntCounter,

    /// Video provider failures by operation
    pub provider_errors_total: IntCounterVec,
}

/// Friend index metrics
#[derive(Clone)]
pub struct FriendMetrics {
    pub cache_hits_total: IntCounter,
    pub cache_misses_total: IntCounter,

    /// Social graph lookups that failed, by applied policy
    pub lookup_failures_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let session_metrics = SessionMetrics::new(&registry)?;
        let friend_metrics = FriendMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            match_metrics,
            session_metrics,
            friend_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn matching(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    pub fn session(&self) -> &SessionMetrics {
        &self.session_metrics
    }

    pub fn friends(&self) -> &FriendMetrics {
        &self.friend_metrics
    }

    /// Record a join request and refresh the waiting gauges
    pub fn record_join(&self, gender: Gender, lengths: (usize, usize), duration: Duration) {
        self.queue_metrics
            .joins_total
            .with_label_values(&[gender.as_str()])
            .inc();
        self.update_queue_lengths(lengths);

        self.match_metrics
            .join_processing_duration
            .observe(duration.as_secs_f64());
    }

    /// Record an explicit leave
    pub fn record_leave(&self, gender: Gender, lengths: (usize, usize)) {
        self.queue_metrics
            .leaves_total
            .with_label_values(&[gender.as_str()])
            .inc();
        self.update_queue_lengths(lengths);
    }

    /// Set the waiting gauges from (male, female) lengths
    pub fn update_queue_lengths(&self, (males, females): (usize, usize)) {
        self.queue_metrics
            .participants_waiting
            .with_label_values(&[Gender::Male.as_str()])
            .set(males as i64);
        self.queue_metrics
            .participants_waiting
            .with_label_values(&[Gender::Female.as_str()])
            .set(females as i64);
    }

    /// Record how long a matched participant waited
    pub fn record_wait_time(&self, gender: Gender, waited: Duration) {
        self.queue_metrics
            .wait_time_seconds
            .with_label_values(&[gender.as_str()])
            .observe(waited.as_secs_f64());
    }

    pub fn record_restored(&self, count: usize) {
        self.queue_metrics.restored_total.inc_by(count as u64);
    }

    /// Record a matching attempt outcome
    pub fn record_match_attempt(&self, outcome: &str, duration: Duration) {
        self.match_metrics
            .attempts_total
            .with_label_values(&[outcome])
            .inc();
        self.match_metrics
            .attempt_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_session_created(&self) {
        self.session_metrics.sessions_created_total.inc();
        self.session_metrics.active_sessions.inc();
    }

    pub fn record_session_closed(&self) {
        self.session_metrics.sessions_closed_total.inc();
        self.session_metrics.active_sessions.dec();
    }

    pub fn record_provider_error(&self, operation: &str) {
        self.session_metrics
            .provider_errors_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn record_friend_cache(&self, hit: bool) {
        if hit {
            self.friend_metrics.cache_hits_total.inc();
        } else {
            self.friend_metrics.cache_misses_total.inc();
        }
    }

    pub fn record_friend_lookup_failure(&self, policy: &str) {
        self.friend_metrics
            .lookup_failures_total
            .with_label_values(&[policy])
            .inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("meeting_matcher_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "meeting_matcher_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new(
                "meeting_matcher_component_health",
                "Component health status",
            ),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let participants_waiting = IntGaugeVec::new(
            Opts::new(
                "meeting_matcher_participants_waiting",
                "Participants currently waiting in queue",
            ),
            &["gender"],
        )?;
        registry.register(Box::new(participants_waiting.clone()))?;

        let joins_total = IntCounterVec::new(
            Opts::new("meeting_matcher_joins_total", "Total join requests"),
            &["gender"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let leaves_total = IntCounterVec::new(
            Opts::new("meeting_matcher_leaves_total", "Total explicit leaves"),
            &["gender"],
        )?;
        registry.register(Box::new(leaves_total.clone()))?;

        let restored_total = IntCounter::new(
            "meeting_matcher_restored_total",
            "Participants re-enqueued after a failed session setup",
        )?;
        registry.register(Box::new(restored_total.clone()))?;

        let wait_time_seconds = HistogramVec::new(
            HistogramOpts::new(
                "meeting_matcher_wait_time_seconds",
                "Queue wait time of matched participants",
            )
            .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
            &["gender"],
        )?;
        registry.register(Box::new(wait_time_seconds.clone()))?;

        Ok(Self {
            participants_waiting,
            joins_total,
            leaves_total,
            restored_total,
            wait_time_seconds,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let attempts_total = IntCounterVec::new(
            Opts::new(
                "meeting_matcher_match_attempts_total",
                "Matching attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(attempts_total.clone()))?;

        let attempt_duration = Histogram::with_opts(
            HistogramOpts::new(
                "meeting_matcher_match_attempt_duration_seconds",
                "Friend hydration and group search time",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(attempt_duration.clone()))?;

        let join_processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "meeting_matcher_join_processing_duration_seconds",
                "Join request processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(join_processing_duration.clone()))?;

        Ok(Self {
            attempts_total,
            attempt_duration,
            join_processing_duration,
        })
    }
}

impl SessionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_sessions = IntGauge::new(
            "meeting_matcher_active_sessions",
            "Video sessions currently tracked",
        )?;
        registry.register(Box::new(active_sessions.clone()))?;

        let sessions_created_total = IntCounter::new(
            "meeting_matcher_sessions_created_total",
            "Total video sessions created",
        )?;
        registry.register(Box::new(sessions_created_total.clone()))?;

        let sessions_closed_total = IntCounter::new(
            "meeting_matcher_sessions_closed_total",
            "Total video sessions closed",
        )?;
        registry.register(Box::new(sessions_closed_total.clone()))?;

        let provider_errors_total = IntCounterVec::new(
            Opts::new(
                "meeting_matcher_provider_errors_total",
                "Video provider failures",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(provider_errors_total.clone()))?;

        Ok(Self {
            active_sessions,
            sessions_created_total,
            sessions_closed_total,
            provider_errors_total,
        })
    }
}

impl FriendMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let cache_hits_total = IntCounter::new(
            "meeting_matcher_friend_cache_hits_total",
            "Friend set cache hits",
        )?;
        registry.register(Box::new(cache_hits_total.clone()))?;

        let cache_misses_total = IntCounter::new(
            "meeting_matcher_friend_cache_misses_total",
            "Friend set cache misses",
        )?;
        registry.register(Box::new(cache_misses_total.clone()))?;

        let lookup_failures_total = IntCounterVec::new(
            Opts::new(
                "meeting_matcher_friend_lookup_failures_total",
                "Failed social graph lookups",
            ),
            &["policy"],
        )?;
        registry.register(Box::new(lookup_failures_total.clone()))?;

        Ok(Self {
            cache_hits_total,
            cache_misses_total,
            lookup_failures_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _queue = collector.queue();
        let _matching = collector.matching();
        let _session = collector.session();
        let _friends = collector.friends();
    }

    #[test]
    fn test_queue_gauges_follow_lengths() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_join(Gender::Male, (4, 2), Duration::from_millis(3));
        collector.record_leave(Gender::Female, (4, 1));

        let waiting = &collector.queue().participants_waiting;
        assert_eq!(waiting.with_label_values(&["male"]).get(), 4);
        assert_eq!(waiting.with_label_values(&["female"]).get(), 1);
        assert_eq!(
            collector.queue().joins_total.with_label_values(&["male"]).get(),
            1
        );
    }

    #[test]
    fn test_session_counters() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_session_created();
        collector.record_session_created();
        collector.record_session_closed();

        assert_eq!(collector.session().active_sessions.get(), 1);
        assert_eq!(collector.session().sessions_created_total.get(), 2);
    }

    #[test]
    fn test_friend_cache_counters() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_friend_cache(true);
        collector.record_friend_cache(false);
        collector.record_friend_cache(false);
        collector.record_friend_lookup_failure("fail_open");

        assert_eq!(collector.friends().cache_hits_total.get(), 1);
        assert_eq!(collector.friends().cache_misses_total.get(), 2);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
        assert!(timer.stop() >= Duration::from_millis(10));
    }
}
