use std::sync::Arc;
use reelpress_core::{Config, EventBus, QueueBackend, SanitizedConfig, WorkerPool};

/// Shared application state
pub struct AppState {
    config: Config,
    queue: Arc<dyn QueueBackend>,
    pool: Arc<WorkerPool>,
    events: EventBus,
}

impl AppState {
    pub fn new(
        config: Config,
        queue: Arc<dyn QueueBackend>,
        pool: Arc<WorkerPool>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            queue,
            pool,
            events,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn queue(&self) -> &dyn QueueBackend {
        self.queue.as_ref()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
