//! Health check endpoints and monitoring
//!
//! Readiness and liveness probes for the meeting matcher, plus a detailed
//! check that exercises the queue store and reports service counters.

use crate::service::meeting::MeetingService;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// What the health checks look at
#[derive(Clone)]
pub struct HealthContext {
    pub service_name: String,
    pub meeting_service: Arc<MeetingService>,
    pub is_running: Arc<RwLock<bool>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Error or detail message
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub males_waiting: usize,
    pub females_waiting: usize,
    pub active_sessions: usize,
    pub matches_made: u64,
    pub stale_attempts: u64,
    pub sessions_closed: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(context: &HealthContext) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(context).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let queue_check = Self::check_queue_store(context).await;
        if queue_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(queue_check);

        checks.push(Self::check_video_provider(context));

        let stats = Self::gather_service_stats(context).await;

        Ok(HealthCheck {
            status: overall_status,
            service: context.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Liveness: the service loop is running
    pub async fn liveness_check(context: &HealthContext) -> Result<HealthStatus> {
        if *context.is_running.read().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness: running and the queue store answers
    pub async fn readiness_check(context: &HealthContext) -> Result<HealthStatus> {
        if !*context.is_running.read().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_queue_store(context).await.status)
    }

    async fn check_service_running(context: &HealthContext) -> ComponentCheck {
        let start = std::time::Instant::now();

        let (status, message) = if *context.is_running.read().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_queue_store(context: &HealthContext) -> ComponentCheck {
        let start = std::time::Instant::now();
        let queue = context.meeting_service.queue();

        let (status, message) = match queue.lengths().await {
            Ok(_) => (HealthStatus::Healthy, Some(queue.backend_name().to_string())),
            Err(e) => {
                error!("Queue store check failed: {}", e);
                (
                    HealthStatus::Unhealthy,
                    Some(format!("{} store unreachable: {}", queue.backend_name(), e)),
                )
            }
        };

        ComponentCheck {
            name: "queue_store".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn check_video_provider(context: &HealthContext) -> ComponentCheck {
        ComponentCheck {
            name: "video_provider".to_string(),
            status: HealthStatus::Healthy,
            message: Some(context.meeting_service.sessions().provider_name().to_string()),
            duration_ms: 0,
        }
    }

    async fn gather_service_stats(context: &HealthContext) -> ServiceStats {
        match context.meeting_service.get_stats().await {
            Ok(stats) => ServiceStats {
                males_waiting: stats.males_waiting,
                females_waiting: stats.females_waiting,
                active_sessions: stats.active_sessions,
                matches_made: stats.matches_made,
                stale_attempts: stats.stale_attempts,
                sessions_closed: stats.sessions_closed,
            },
            Err(e) => {
                debug!("Failed to get meeting stats for health check: {}", e);
                ServiceStats::default()
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
