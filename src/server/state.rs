use std::sync::Arc;
use std::time::Instant;

use crate::blog::BlogRepository;
use crate::config::Settings;
use crate::database::{ConnectionPoolManager, HeartbeatProbe, QueryExecutor};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pool_manager: Arc<ConnectionPoolManager>,
    pub executor: QueryExecutor,
    pub blogs: BlogRepository,
    pub heartbeat: HeartbeatProbe,
    pub start_time: Instant,
}

impl AppState {
    /// Build the state. No database connection is opened until the first query.
    pub fn new(settings: Settings) -> Self {
        let pool_manager = Arc::new(ConnectionPoolManager::new(
            settings.database.pool_config(),
            settings.database.diagnostics_enabled,
        ));
        Self::with_pool_manager(settings, pool_manager)
    }

    pub fn with_pool_manager(settings: Settings, pool_manager: Arc<ConnectionPoolManager>) -> Self {
        let executor = QueryExecutor::new(pool_manager.clone());
        let blogs = BlogRepository::new(executor.clone());
        let heartbeat = HeartbeatProbe::new(settings.database.heartbeat_pool_config());

        Self {
            settings: Arc::new(settings),
            pool_manager,
            executor,
            blogs,
            heartbeat,
            start_time: Instant::now(),
        }
    }
}
