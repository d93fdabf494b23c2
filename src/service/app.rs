//! Main application state and service coordination
//!
//! AppState builds every component from configuration, wires them into the
//! meeting service, and owns the background tasks and the health server.

use crate::config::{AppConfig, QueueBackend, VideoBackend};
use crate::events::{BroadcastEventPublisher, EventPublisher, LoggingEventPublisher};
use crate::friends::{FriendIndex, HttpSocialGraph, SocialGraph, StaticSocialGraph};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector, MetricsService};
use crate::queue::{InMemoryQueueStore, ParticipantQueue, QueueStore, RedisQueueStore};
use crate::service::health::{HealthCheck, HealthContext, HealthStatus};
use crate::service::meeting::MeetingService;
use crate::session::{
    InMemoryVideoProvider, OpenViduProvider, SessionCoordinator, VideoProvider,
};
use crate::types::MeetingEvent;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Capacity of the outbound event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Backend connection error: {message}")]
    Backend { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    meeting_service: Arc<MeetingService>,

    /// Fan-out of SessionReady and SessionClosed events
    event_publisher: Arc<BroadcastEventPublisher>,

    metrics_service: Arc<MetricsService>,

    background_tasks: Vec<JoinHandle<()>>,

    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing meeting matcher service");
        info!(
            "Configuration: service={}, group_size={}, queue_backend={:?}, video_provider={:?}",
            config.service.name,
            config.matching.group_size,
            config.queue.backend,
            config.video.provider
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let queue_store = Self::initialize_queue_store(&config).await?;
        let queue = Arc::new(ParticipantQueue::new(queue_store));

        let social_graph = Self::initialize_social_graph(&config)?;
        let friend_index = Arc::new(
            FriendIndex::from_settings(
                social_graph,
                &config.friends,
                config.matching.friend_lookup_policy,
            )
            .with_metrics(metrics_collector.clone()),
        );

        let video_provider = Self::initialize_video_provider(&config)?;
        let sessions = Arc::new(
            SessionCoordinator::new(video_provider).with_metrics(metrics_collector.clone()),
        );

        let event_publisher = Arc::new(BroadcastEventPublisher::new(EVENT_CHANNEL_CAPACITY));

        let meeting_service = Arc::new(MeetingService::new(
            queue,
            friend_index,
            sessions,
            event_publisher.clone(),
            metrics_collector.clone(),
            config.matching.clone(),
        ));

        let is_running = Arc::new(RwLock::new(false));

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };
        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_context(
                HealthContext {
                    service_name: config.service.name.clone(),
                    meeting_service: meeting_service.clone(),
                    is_running: is_running.clone(),
                },
            ),
        );
        let metrics_service = Arc::new(MetricsService::new(metrics_collector, health_server));

        Ok(Self {
            config,
            meeting_service,
            event_publisher,
            metrics_service,
            background_tasks: Vec::new(),
            is_running,
        })
    }

    /// Start the health endpoints and background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting meeting matcher service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await?;
        self.start_background_tasks().await?;

        info!("Meeting matcher service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of meeting matcher service");

        *self.is_running.write().await = false;

        self.stop_background_tasks().await;

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("Metrics service stopped");
        }

        let final_stats =
            self.meeting_service
                .get_stats()
                .await
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("Meeting matcher shutdown completed");

        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// The service the surrounding application calls into
    pub fn meeting_service(&self) -> Arc<MeetingService> {
        self.meeting_service.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Receive SessionReady and SessionClosed events for delivery to clients
    pub fn subscribe_events(&self) -> broadcast::Receiver<MeetingEvent> {
        self.event_publisher.subscribe()
    }

    async fn initialize_queue_store(
        config: &AppConfig,
    ) -> Result<Arc<dyn QueueStore>, ServiceError> {
        match config.queue.backend {
            QueueBackend::Memory => {
                info!("Using in-memory participant queues");
                Ok(Arc::new(InMemoryQueueStore::new()))
            }
            QueueBackend::Redis => {
                info!("Connecting to Redis queue store: {}", config.queue.redis_url);
                let store = RedisQueueStore::connect(
                    &config.queue.redis_url,
                    &config.queue.key_prefix,
                )
                .await
                .map_err(|e| ServiceError::Backend {
                    message: format!("Failed to connect to Redis: {}", e),
                })?;
                Ok(Arc::new(store))
            }
        }
    }

    fn initialize_social_graph(config: &AppConfig) -> Result<Arc<dyn SocialGraph>, ServiceError> {
        match &config.friends.social_graph_url {
            Some(url) => {
                info!("Using social graph service at {}", url);
                let graph = HttpSocialGraph::new(url, config.social_graph_timeout()).map_err(
                    |e| ServiceError::Initialization {
                        message: format!("Failed to create social graph client: {}", e),
                    },
                )?;
                Ok(Arc::new(graph))
            }
            None => {
                warn!("No social graph URL configured, every participant starts without friends");
                Ok(Arc::new(StaticSocialGraph::new()))
            }
        }
    }

    fn initialize_video_provider(
        config: &AppConfig,
    ) -> Result<Arc<dyn VideoProvider>, ServiceError> {
        match config.video.provider {
            VideoBackend::InMemory => {
                info!("Using in-memory video provider");
                Ok(Arc::new(InMemoryVideoProvider::new()))
            }
            VideoBackend::OpenVidu => {
                if config.video.openvidu_secret.is_empty() {
                    return Err(ServiceError::Configuration {
                        message: "OpenVidu secret must be set for the openvidu provider"
                            .to_string(),
                    });
                }
                info!("Using OpenVidu at {}", config.video.openvidu_url);
                let provider = OpenViduProvider::new(
                    &config.video.openvidu_url,
                    &config.video.openvidu_secret,
                    config.provider_timeout(),
                )
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create OpenVidu client: {}", e),
                })?;
                Ok(Arc::new(provider))
            }
        }
    }

    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });
        self.background_tasks.push(metrics_handle);

        // Give the listener a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("Metrics service started on port {}", port);
        Ok(())
    }

    async fn start_background_tasks(&mut self) -> Result<(), ServiceError> {
        info!("Starting background maintenance tasks...");

        info!("Starting queue gauge refresh task (15s interval)...");
        let queue_gauge_task = {
            let meeting_service = self.meeting_service.clone();
            let metrics_collector = self.metrics_service.collector();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(15));
                info!("Queue gauge refresh task started");

                while *is_running.read().await {
                    interval.tick().await;

                    match meeting_service.queue_lengths().await {
                        Ok(lengths) => {
                            debug!(
                                "Refreshing queue gauges - males: {}, females: {}",
                                lengths.0, lengths.1
                            );
                            metrics_collector.update_queue_lengths(lengths);
                        }
                        Err(e) => warn!("Failed to read queue lengths for metrics: {}", e),
                    }
                }

                info!("Queue gauge refresh task stopped");
            })
        };

        info!("Starting health metrics task (60s interval)...");
        let health_metrics_task = {
            let context = HealthContext {
                service_name: self.config.service.name.clone(),
                meeting_service: self.meeting_service.clone(),
                is_running: self.is_running.clone(),
            };
            let metrics_collector = self.metrics_service.collector();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                let start_time = tokio::time::Instant::now();
                info!("Health metrics task started");

                while *is_running.read().await {
                    interval.tick().await;

                    let uptime_seconds = start_time.elapsed().as_secs() as i64;
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(uptime_seconds);

                    match HealthCheck::check(&context).await {
                        Ok(health) => {
                            let status = match health.status {
                                HealthStatus::Healthy => 2,
                                HealthStatus::Degraded => 1,
                                HealthStatus::Unhealthy => 0,
                            };
                            metrics_collector.update_health_status(status);
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status != HealthStatus::Unhealthy,
                                );
                            }
                            debug!(
                                "Updated service health metrics - uptime: {}s, status: {}",
                                uptime_seconds, health.status
                            );
                        }
                        Err(e) => {
                            warn!("Health check failed: {}", e);
                            metrics_collector.update_health_status(0);
                        }
                    }
                }

                info!("Health metrics task stopped");
            })
        };

        info!("Starting event log task...");
        let event_log_task = {
            let mut receiver = self.event_publisher.subscribe();
            let log = LoggingEventPublisher::new();

            tokio::spawn(async move {
                loop {
                    let result = match receiver.recv().await {
                        Ok(MeetingEvent::SessionReady(event)) => {
                            log.publish_session_ready(event).await
                        }
                        Ok(MeetingEvent::SessionClosed(event)) => {
                            log.publish_session_closed(event).await
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Event log lagged, skipped {} events", skipped);
                            Ok(())
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if let Err(e) = result {
                        warn!("Failed to log event: {}", e);
                    }
                }

                info!("Event log task stopped");
            })
        };

        self.background_tasks.push(queue_gauge_task);
        self.background_tasks.push(health_metrics_task);
        self.background_tasks.push(event_log_task);

        info!("3 background maintenance tasks started successfully");
        Ok(())
    }

    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("All {} background tasks stopped", task_count);
    }
}
